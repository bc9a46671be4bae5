//! Outbound transfers and their execution.
//!
//! A transfer reserves the sender's funds the moment it is created; every
//! later step either delivers those funds or returns them. Execution is
//! driven by a worker pass, so a transfer that hits a connection error
//! simply stays Scheduled for the next pass.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use payhub_core::events::HubEvent;
use payhub_core::state_machine::{TransferEvent, TransferState, TransferStateMachine};
use payhub_core::types::{Address, NetworkKind, TokenAmount, TransferId, UserId};
use payhub_ledger::AccountId;
use payhub_routing::WalletPool;

use crate::error::SettlementError;
use crate::orchestrator::SettlementOrchestrator;
use crate::provider::{NetworkProvider, OutboundTx, ProviderError};

/// Where a transfer is headed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Book transfer to another hub user.
    Internal { receiver: UserId },
    /// On-chain transfer to an external address.
    Blockchain { to: Address },
    /// Channel transfer, tagged with a payment identifier.
    Channel { to: Address, identifier: u64 },
}

impl TransferKind {
    /// The network this transfer settles over.
    pub fn network(&self) -> NetworkKind {
        match self {
            Self::Internal { .. } => NetworkKind::Internal,
            Self::Blockchain { .. } => NetworkKind::Blockchain,
            Self::Channel { .. } => NetworkKind::Channel,
        }
    }
}

/// Proof of submission to an external network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Transaction hash or network identifier.
    pub tx_ref: String,
    /// When the submission was accepted.
    pub executed_at: DateTime<Utc>,
}

/// An outbound transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub sender: UserId,
    pub amount: TokenAmount,
    pub kind: TransferKind,
    pub state: TransferState,
    /// Set once the transfer is submitted externally.
    pub receipt: Option<TransferReceipt>,
    /// Why the transfer failed, when it did.
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Creates, executes, and finalizes transfers.
pub struct TransferManager {
    orchestrator: Arc<SettlementOrchestrator>,
    wallets: Arc<WalletPool>,
    transfers: DashMap<TransferId, Transfer>,
}

impl TransferManager {
    pub fn new(orchestrator: Arc<SettlementOrchestrator>, wallets: Arc<WalletPool>) -> Self {
        Self {
            orchestrator,
            wallets,
            transfers: DashMap::new(),
        }
    }

    /// Accept a transfer request and reserve the funds.
    pub fn create(
        &self,
        sender: UserId,
        amount: TokenAmount,
        kind: TransferKind,
    ) -> Result<TransferId, SettlementError> {
        let transfer = Transfer {
            id: TransferId::new(),
            sender,
            amount,
            kind,
            state: TransferState::Scheduled,
            receipt: None,
            failure_reason: None,
            created_at: Utc::now(),
        };
        self.orchestrator.on_transfer_created(&transfer)?;
        let id = transfer.id;
        tracing::info!(transfer_id = %id, network = %transfer.kind.network(), "transfer scheduled");
        self.transfers.insert(id, transfer);
        self.publish_state(id, TransferState::Scheduled);
        Ok(id)
    }

    /// Look up a transfer.
    pub fn get(&self, id: TransferId) -> Option<Transfer> {
        self.transfers.get(&id).map(|t| t.clone())
    }

    /// The processed transfer whose receipt references `tx_ref`, if any.
    pub fn processed_by_receipt(&self, tx_ref: &str) -> Option<TransferId> {
        self.transfers
            .iter()
            .find(|kv| {
                kv.state == TransferState::Processed
                    && kv
                        .receipt
                        .as_ref()
                        .map(|r| r.tx_ref == tx_ref)
                        .unwrap_or(false)
            })
            .map(|kv| kv.id)
    }

    /// Transfers awaiting execution on one network.
    pub fn scheduled(&self, network: NetworkKind) -> Vec<TransferId> {
        self.transfers
            .iter()
            .filter(|kv| kv.state == TransferState::Scheduled && kv.kind.network() == network)
            .map(|kv| kv.id)
            .collect()
    }

    /// Withdraw a transfer before execution. Restores the sender's balance
    /// exactly; only Scheduled transfers can be canceled.
    pub fn cancel(&self, id: TransferId) -> Result<(), SettlementError> {
        let transfer = self.transition(id, TransferEvent::Canceled)?;
        self.orchestrator.on_transfer_reverted(&transfer)?;
        self.publish_state(id, TransferState::Canceled);
        Ok(())
    }

    /// Execute a scheduled transfer against the given provider.
    ///
    /// Finalized transfers are a warned no-op. The balance precondition is
    /// checked before any provider call: if the reservation overdrew the
    /// sender, the transfer fails without touching the network.
    pub async fn execute(
        &self,
        id: TransferId,
        provider: &dyn NetworkProvider,
    ) -> Result<TransferState, SettlementError> {
        let transfer = self
            .get(id)
            .ok_or_else(|| SettlementError::TransferNotFound(id.to_string()))?;

        if transfer.state.is_final() {
            tracing::warn!(transfer_id = %id, state = %transfer.state, "transfer already finalized");
            return Ok(transfer.state);
        }
        if transfer.state == TransferState::Processed {
            return Ok(transfer.state);
        }

        let sender = AccountId::User(transfer.sender.clone());
        let balance = self
            .orchestrator
            .ledger()
            .balance(&sender, &transfer.amount.token);
        if balance < 0 {
            tracing::warn!(
                transfer_id = %id,
                balance,
                required = transfer.amount.value,
                "transfer overdraws sender"
            );
            return self.fail(id, "insufficient balance");
        }

        match transfer.kind.clone() {
            TransferKind::Internal { receiver } => {
                if !self
                    .orchestrator
                    .accounts()
                    .user_exists(&receiver)
                {
                    return self.fail(id, "receiver not found");
                }
                self.orchestrator
                    .on_internal_transfer_confirmed(&transfer, &receiver)?;
                let confirmed = self.transition(id, TransferEvent::Confirmed)?;
                self.publish_state(id, confirmed.state);
                Ok(confirmed.state)
            }
            TransferKind::Blockchain { to } => {
                let from = match self.pick_funded_wallet(provider, &transfer.amount).await? {
                    Some(address) => address,
                    None => {
                        return self.fail(id, "no funded operator wallet");
                    }
                };
                let nonce = provider.next_nonce(&from).await?;
                let tx = OutboundTx {
                    from: Some(from),
                    to,
                    amount: transfer.amount.clone(),
                    nonce: Some(nonce),
                    identifier: None,
                };
                match self.submit_with_nonce_retry(provider, tx).await {
                    Ok(tx_ref) => self.record_submission(id, tx_ref),
                    Err(ProviderError::Connection(e)) => {
                        Err(ProviderError::Connection(e).into())
                    }
                    Err(ProviderError::UnsupportedMethod(e)) => {
                        Err(ProviderError::UnsupportedMethod(e).into())
                    }
                    Err(e) => self.fail(id, &e.to_string()),
                }
            }
            TransferKind::Channel { to, identifier } => {
                let tx = OutboundTx {
                    from: None,
                    to,
                    amount: transfer.amount.clone(),
                    nonce: None,
                    identifier: Some(identifier),
                };
                match provider.submit(tx).await {
                    Ok(tx_ref) => self.record_submission(id, tx_ref),
                    Err(ProviderError::Connection(e)) => {
                        Err(ProviderError::Connection(e).into())
                    }
                    Err(ProviderError::UnsupportedMethod(e)) => {
                        Err(ProviderError::UnsupportedMethod(e).into())
                    }
                    Err(e) => self.fail(id, &e.to_string()),
                }
            }
        }
    }

    /// Finalize a processed transfer after the network confirmed it.
    pub fn confirm(
        &self,
        id: TransferId,
        fee: Option<TokenAmount>,
    ) -> Result<(), SettlementError> {
        let transfer = self.transition(id, TransferEvent::Confirmed)?;
        self.orchestrator
            .on_transfer_confirmed(&transfer, transfer.kind.network(), fee)?;
        self.publish_state(id, TransferState::Confirmed);
        Ok(())
    }

    /// Fail a transfer and return the reservation.
    pub fn fail(&self, id: TransferId, reason: &str) -> Result<TransferState, SettlementError> {
        let transfer = self.transition(id, TransferEvent::Failed)?;
        if let Some(mut entry) = self.transfers.get_mut(&id) {
            entry.failure_reason = Some(reason.to_string());
        }
        self.orchestrator.on_transfer_reverted(&transfer)?;
        tracing::warn!(transfer_id = %id, reason, "transfer failed");
        self.publish_state(id, TransferState::Failed);
        Ok(TransferState::Failed)
    }

    /// Submit, retrying exactly once with the next nonce if the node
    /// reports the nonce as already used.
    async fn submit_with_nonce_retry(
        &self,
        provider: &dyn NetworkProvider,
        tx: OutboundTx,
    ) -> Result<String, ProviderError> {
        match provider.submit(tx.clone()).await {
            Err(ProviderError::NonceTooLow) => {
                let retry = OutboundTx {
                    nonce: tx.nonce.map(|n| n + 1),
                    ..tx
                };
                tracing::warn!(nonce = ?retry.nonce, "nonce too low, retrying once");
                provider.submit(retry).await
            }
            other => other,
        }
    }

    /// A random operator wallet whose on-chain balance covers the amount.
    async fn pick_funded_wallet(
        &self,
        provider: &dyn NetworkProvider,
        amount: &TokenAmount,
    ) -> Result<Option<Address>, SettlementError> {
        let mut funded = Vec::new();
        for address in self.wallets.addresses() {
            let balance = provider.balance_of(&address, &amount.token).await?;
            if balance >= amount.value {
                funded.push(address);
            }
        }
        Ok(funded.choose(&mut rand::thread_rng()).cloned())
    }

    fn record_submission(
        &self,
        id: TransferId,
        tx_ref: String,
    ) -> Result<TransferState, SettlementError> {
        let transfer = self.transition(id, TransferEvent::Submitted)?;
        if let Some(mut entry) = self.transfers.get_mut(&id) {
            entry.receipt = Some(TransferReceipt {
                tx_ref: tx_ref.clone(),
                executed_at: Utc::now(),
            });
        }
        tracing::info!(transfer_id = %id, tx_ref = %tx_ref, "transfer submitted");
        self.publish_state(id, transfer.state);
        Ok(transfer.state)
    }

    /// Apply a state machine event and persist the new state.
    /// Returns the updated transfer.
    fn transition(
        &self,
        id: TransferId,
        event: TransferEvent,
    ) -> Result<Transfer, SettlementError> {
        let mut entry = self
            .transfers
            .get_mut(&id)
            .ok_or_else(|| SettlementError::TransferNotFound(id.to_string()))?;
        let new_state = TransferStateMachine::transition(entry.state, event)?;
        entry.state = new_state;
        Ok(entry.clone())
    }

    fn publish_state(&self, id: TransferId, state: TransferState) {
        self.orchestrator
            .bus()
            .publish(HubEvent::TransferStateChanged {
                transfer_id: id,
                state,
            });
    }
}
