//! Ledger side-effects of settlement events.
//!
//! Every balance-touching moment in a transfer's or payment's life goes
//! through one method here, so the posting rules live in a single place and
//! callers invoke them explicitly. Events go out on the bus only after the
//! postings succeed.

use std::sync::Arc;

use payhub_core::events::{EventBus, HubEvent};
use payhub_core::types::{NetworkKind, PaymentId, TokenAmount};
use payhub_ledger::{AccountId, Accounts, Ledger, Reference};
use payhub_routing::Deposit;

use crate::error::SettlementError;
use crate::transfer::Transfer;

/// Posts the double-entry consequences of settlement events.
pub struct SettlementOrchestrator {
    ledger: Arc<Ledger>,
    accounts: Arc<Accounts>,
    bus: EventBus,
}

impl SettlementOrchestrator {
    pub fn new(ledger: Arc<Ledger>, accounts: Arc<Accounts>, bus: EventBus) -> Self {
        Self {
            ledger,
            accounts,
            bus,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn accounts(&self) -> &Arc<Accounts> {
        &self.accounts
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Reserve the transfer amount: debit the sender, credit the treasury.
    /// From here on the sender cannot double-spend the funds.
    pub fn on_transfer_created(&self, transfer: &Transfer) -> Result<(), SettlementError> {
        let sender = AccountId::User(transfer.sender.clone());
        if !self.accounts.account_exists(&sender) {
            return Err(SettlementError::UserNotFound(transfer.sender.to_string()));
        }
        self.ledger.post(
            sender,
            AccountId::Treasury,
            &transfer.amount,
            Reference::Transfer(transfer.id),
        )?;
        Ok(())
    }

    /// Settle an internal transfer: move the reserved funds from the
    /// treasury to the receiving user.
    pub fn on_internal_transfer_confirmed(
        &self,
        transfer: &Transfer,
        receiver: &payhub_core::types::UserId,
    ) -> Result<(), SettlementError> {
        let receiver = AccountId::User(receiver.clone());
        if !self.accounts.account_exists(&receiver) {
            return Err(SettlementError::UserNotFound(receiver.to_string()));
        }
        self.ledger.post(
            AccountId::Treasury,
            receiver,
            &transfer.amount,
            Reference::Transfer(transfer.id),
        )?;
        Ok(())
    }

    /// Settle an external transfer: the reserved funds left through the
    /// network's clearing account. A fee, when charged, comes out of the
    /// sender on top of the reservation.
    pub fn on_transfer_confirmed(
        &self,
        transfer: &Transfer,
        network: NetworkKind,
        fee: Option<TokenAmount>,
    ) -> Result<(), SettlementError> {
        self.ledger.post(
            AccountId::Treasury,
            AccountId::Network(network),
            &transfer.amount,
            Reference::Transfer(transfer.id),
        )?;
        if let Some(fee) = fee {
            if !fee.is_zero() {
                self.ledger.post(
                    AccountId::User(transfer.sender.clone()),
                    AccountId::Network(network),
                    &fee,
                    Reference::TransferFee(transfer.id),
                )?;
            }
        }
        Ok(())
    }

    /// Return the reservation after a failed or canceled transfer. The
    /// sender's balance is restored exactly.
    pub fn on_transfer_reverted(&self, transfer: &Transfer) -> Result<(), SettlementError> {
        self.ledger.post(
            AccountId::Treasury,
            AccountId::User(transfer.sender.clone()),
            &transfer.amount,
            Reference::TransferReversal(transfer.id),
        )?;
        Ok(())
    }

    /// Record a confirmed inbound payment: value entered through the
    /// network's clearing account and is owed to the depositor.
    pub fn on_payment_confirmed(
        &self,
        deposit: &Deposit,
        payment_id: PaymentId,
        amount: &TokenAmount,
        network: NetworkKind,
    ) -> Result<(), SettlementError> {
        self.ledger.post(
            AccountId::Network(network),
            AccountId::Treasury,
            amount,
            Reference::PaymentConfirmation(payment_id),
        )?;
        self.ledger.post(
            AccountId::Treasury,
            AccountId::User(deposit.user.clone()),
            amount,
            Reference::PaymentCredit(payment_id),
        )?;
        self.bus.publish(HubEvent::PaymentConfirmed {
            deposit_id: deposit.id,
            payment_id,
        });
        Ok(())
    }

    /// Undo a payment confirmation invalidated by a chain reorganization.
    /// Both pairs posted by [`on_payment_confirmed`] are unwound.
    ///
    /// [`on_payment_confirmed`]: SettlementOrchestrator::on_payment_confirmed
    pub fn on_payment_reverted(&self, payment_id: PaymentId) {
        let confirmation = self
            .ledger
            .unwind(&Reference::PaymentConfirmation(payment_id));
        let credit = self.ledger.unwind(&Reference::PaymentCredit(payment_id));
        tracing::warn!(
            payment_id = %payment_id,
            removed = confirmation + credit,
            "reverted payment confirmation"
        );
        self.bus.publish(HubEvent::PaymentReverted { payment_id });
    }
}
