//! Inbound payment tracking and confirmation.
//!
//! The tracker turns provider observations into payment records: it matches
//! transactions against open routes, promotes settled payments once they are
//! buried deep enough, and unwinds everything above a regressed height when
//! a chain reorganizes. Matching is idempotent on the payment's native
//! identifier, so replayed blocks and duplicate deliveries are no-ops.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use payhub_core::config::HubConfig;
use payhub_core::events::HubEvent;
use payhub_core::state_machine::TransferState;
use payhub_core::types::{DepositId, NetworkKind, PaymentId, RouteId, TokenAmount, TransferId};
use payhub_routing::{Deposit, DepositRegistry, DepositStatus, Route, RouteAllocator};

use crate::error::SettlementError;
use crate::orchestrator::SettlementOrchestrator;
use crate::provider::{BlockData, TxData};
use crate::transfer::TransferManager;

/// How far along an inbound payment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Observed in the mempool, not yet mined.
    Seen,
    /// Mined (or delivered off-chain) but below the confirmation threshold.
    Settled,
    /// Past the threshold; ledger pairs are posted.
    Confirmed,
}

/// The native identity of a payment on its network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentOrigin {
    Blockchain { chain_id: u64, tx_hash: String },
    Channel { node_id: String, native_id: u64 },
    Internal,
}

/// An inbound payment matched to a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub route_id: RouteId,
    pub deposit_id: DepositId,
    pub amount: TokenAmount,
    pub origin: PaymentOrigin,
    pub status: PaymentStatus,
    /// Block the payment landed in, for blockchain payments.
    pub block_number: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Tracks payments and drives them to confirmation.
pub struct ConfirmationTracker {
    config: HubConfig,
    orchestrator: Arc<SettlementOrchestrator>,
    allocator: Arc<RouteAllocator>,
    deposits: Arc<DepositRegistry>,
    payments: DashMap<PaymentId, Payment>,
    seen_chain: DashMap<(u64, String), PaymentId>,
    seen_channel: DashMap<(String, u64), PaymentId>,
    // chain_id -> highest processed block
    cursors: DashMap<u64, u64>,
    // (chain_id, number) -> block hash
    blocks: DashMap<(u64, u64), String>,
    // Wired in after construction; lets mined receipts finalize transfers.
    transfers: OnceLock<Arc<TransferManager>>,
    // transfer -> (chain_id, block its receipt landed in)
    outbound: DashMap<TransferId, (u64, u64)>,
}

impl ConfirmationTracker {
    pub fn new(
        config: HubConfig,
        orchestrator: Arc<SettlementOrchestrator>,
        allocator: Arc<RouteAllocator>,
        deposits: Arc<DepositRegistry>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            allocator,
            deposits,
            payments: DashMap::new(),
            seen_chain: DashMap::new(),
            seen_channel: DashMap::new(),
            cursors: DashMap::new(),
            blocks: DashMap::new(),
            transfers: OnceLock::new(),
            outbound: DashMap::new(),
        }
    }

    /// Wire in the transfer manager so receipts observed on-chain can
    /// finalize their transfers. Called once while assembling the hub.
    pub fn attach_transfers(&self, manager: Arc<TransferManager>) {
        let _ = self.transfers.set(manager);
    }

    /// Highest processed block for a chain.
    pub fn cursor(&self, chain_id: u64) -> u64 {
        self.cursors.get(&chain_id).map(|c| *c).unwrap_or(0)
    }

    /// Look up a payment.
    pub fn payment(&self, id: PaymentId) -> Option<Payment> {
        self.payments.get(&id).map(|p| p.clone())
    }

    /// All payments matched for a deposit.
    pub fn payments_for(&self, deposit_id: DepositId) -> Vec<Payment> {
        self.payments
            .iter()
            .filter(|kv| kv.deposit_id == deposit_id)
            .map(|kv| kv.clone())
            .collect()
    }

    /// Ingest one sealed block: match its transactions against open
    /// routes, advance the cursor, then re-evaluate promotions.
    pub fn process_block(&self, block: &BlockData) -> Result<(), SettlementError> {
        for tx in &block.transactions {
            if self.note_outbound(block.chain_id, block.number, &tx.hash) {
                continue;
            }
            let Some(to) = &tx.to else { continue };
            let Some(route) = self.allocator.match_blockchain(to, block.number, block.number)
            else {
                continue;
            };
            if route.token != tx.token {
                continue;
            }
            self.record_chain_payment(&route, block.chain_id, tx, block.number);
        }

        self.blocks
            .insert((block.chain_id, block.number), block.hash.clone());
        let mut cursor = self.cursors.entry(block.chain_id).or_insert(0);
        if block.number > *cursor {
            *cursor = block.number;
        }
        drop(cursor);

        self.orchestrator.bus().publish(HubEvent::BlockSealed {
            chain_id: block.chain_id,
            number: block.number,
        });

        self.promote(block.chain_id)
    }

    /// Note a mempool transaction so the deposit shows activity before the
    /// payment is mined. Creates a `Seen` record that upgrades once the
    /// transaction lands in a block.
    pub fn note_mempool_tx(&self, chain_id: u64, tx: &TxData) {
        let key = (chain_id, tx.hash.clone());
        if self.seen_chain.contains_key(&key) {
            return;
        }
        let Some(to) = &tx.to else { return };
        let height = self.cursor(chain_id);
        let Some(route) = self.allocator.match_blockchain(to, height, height) else {
            return;
        };
        if route.token != tx.token {
            return;
        }

        let payment = Payment {
            id: PaymentId::new(),
            route_id: route.id,
            deposit_id: route.deposit_id,
            amount: TokenAmount::new(tx.token.clone(), tx.value),
            origin: PaymentOrigin::Blockchain {
                chain_id,
                tx_hash: tx.hash.clone(),
            },
            status: PaymentStatus::Seen,
            block_number: None,
            created_at: Utc::now(),
        };
        tracing::info!(payment_id = %payment.id, tx_hash = %tx.hash, "payment seen in mempool");
        self.seen_chain.insert(key, payment.id);
        self.payments.insert(payment.id, payment);
    }

    /// Record or upgrade a mined payment. Duplicate deliveries of the same
    /// transaction are no-ops.
    fn record_chain_payment(&self, route: &Route, chain_id: u64, tx: &TxData, block_number: u64) {
        let key = (chain_id, tx.hash.clone());
        if let Some(existing) = self.seen_chain.get(&key) {
            let payment_id = *existing;
            drop(existing);
            if let Some(mut payment) = self.payments.get_mut(&payment_id) {
                if payment.status == PaymentStatus::Seen {
                    payment.status = PaymentStatus::Settled;
                    payment.block_number = Some(block_number);
                    let event = HubEvent::DepositReceived {
                        deposit_id: payment.deposit_id,
                        payment_id,
                        amount: payment.amount.clone(),
                    };
                    drop(payment);
                    tracing::info!(payment_id = %payment_id, block_number, "seen payment mined");
                    self.orchestrator.bus().publish(event);
                }
            }
            return;
        }

        let payment = Payment {
            id: PaymentId::new(),
            route_id: route.id,
            deposit_id: route.deposit_id,
            amount: TokenAmount::new(tx.token.clone(), tx.value),
            origin: PaymentOrigin::Blockchain {
                chain_id,
                tx_hash: tx.hash.clone(),
            },
            status: PaymentStatus::Settled,
            block_number: Some(block_number),
            created_at: Utc::now(),
        };
        tracing::info!(
            payment_id = %payment.id,
            deposit_id = %route.deposit_id,
            value = tx.value,
            block_number,
            "payment settled"
        );
        self.orchestrator.bus().publish(HubEvent::DepositReceived {
            deposit_id: route.deposit_id,
            payment_id: payment.id,
            amount: payment.amount.clone(),
        });
        self.seen_chain.insert(key, payment.id);
        self.payments.insert(payment.id, payment);
    }

    /// Record a channel payment. Channel delivery is final, so the payment
    /// confirms immediately. Idempotent on (node, native id).
    pub fn channel_payment(
        &self,
        node_id: &str,
        route_id: RouteId,
        native_id: u64,
        value: u128,
    ) -> Result<(), SettlementError> {
        let key = (node_id.to_string(), native_id);
        if self.seen_channel.contains_key(&key) {
            return Ok(());
        }
        let Some(route) = self.allocator.match_channel(route_id, Utc::now()) else {
            tracing::warn!(route_id = %route_id, "channel payment without open route");
            return Ok(());
        };

        let payment = Payment {
            id: PaymentId::new(),
            route_id: route.id,
            deposit_id: route.deposit_id,
            amount: TokenAmount::new(route.token.clone(), value),
            origin: PaymentOrigin::Channel {
                node_id: node_id.to_string(),
                native_id,
            },
            status: PaymentStatus::Confirmed,
            block_number: None,
            created_at: Utc::now(),
        };
        self.seen_channel.insert(key, payment.id);
        self.orchestrator.bus().publish(HubEvent::DepositReceived {
            deposit_id: route.deposit_id,
            payment_id: payment.id,
            amount: payment.amount.clone(),
        });
        self.confirm_payment(&payment, &route, NetworkKind::Channel)?;
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    /// Record an internal payment against an internal route. Book credits
    /// are final, so the payment confirms immediately.
    pub fn internal_payment(&self, route_id: RouteId, value: u128) -> Result<(), SettlementError> {
        let Some(route) = self.allocator.route(route_id) else {
            return Ok(());
        };
        if route.network() != NetworkKind::Internal {
            return Ok(());
        }

        let payment = Payment {
            id: PaymentId::new(),
            route_id: route.id,
            deposit_id: route.deposit_id,
            amount: TokenAmount::new(route.token.clone(), value),
            origin: PaymentOrigin::Internal,
            status: PaymentStatus::Confirmed,
            block_number: None,
            created_at: Utc::now(),
        };
        self.orchestrator.bus().publish(HubEvent::DepositReceived {
            deposit_id: route.deposit_id,
            payment_id: payment.id,
            amount: payment.amount.clone(),
        });
        self.confirm_payment(&payment, &route, NetworkKind::Internal)?;
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    /// Promote settled payments that are now buried deep enough.
    fn promote(&self, chain_id: u64) -> Result<(), SettlementError> {
        let height = self.cursor(chain_id);
        let ready: Vec<Payment> = self
            .payments
            .iter()
            .filter(|kv| {
                kv.status == PaymentStatus::Settled
                    && matches!(&kv.origin, PaymentOrigin::Blockchain { chain_id: c, .. } if *c == chain_id)
                    && kv
                        .block_number
                        .map(|b| height.saturating_sub(b) >= self.config.minimum_confirmations)
                        .unwrap_or(false)
            })
            .map(|kv| kv.clone())
            .collect();

        for payment in ready {
            let Some(route) = self.allocator.route(payment.route_id) else {
                continue;
            };
            self.confirm_payment(&payment, &route, NetworkKind::Blockchain)?;
            if let Some(mut entry) = self.payments.get_mut(&payment.id) {
                entry.status = PaymentStatus::Confirmed;
            }
        }

        if let Some(manager) = self.transfers.get() {
            let mined: Vec<TransferId> = self
                .outbound
                .iter()
                .filter(|kv| {
                    kv.0 == chain_id
                        && height.saturating_sub(kv.1) >= self.config.minimum_confirmations
                })
                .map(|kv| *kv.key())
                .collect();
            for transfer_id in mined {
                if manager.get(transfer_id).map(|t| t.state) == Some(TransferState::Processed) {
                    manager.confirm(transfer_id, None)?;
                }
                self.outbound.remove(&transfer_id);
            }
        }
        Ok(())
    }

    /// Whether the transaction is one of our own submissions; if so, note
    /// the block its receipt landed in.
    fn note_outbound(&self, chain_id: u64, block_number: u64, tx_hash: &str) -> bool {
        let Some(manager) = self.transfers.get() else {
            return false;
        };
        let Some(transfer_id) = manager.processed_by_receipt(tx_hash) else {
            return false;
        };
        tracing::info!(transfer_id = %transfer_id, block_number, "outbound transfer mined");
        self.outbound.insert(transfer_id, (chain_id, block_number));
        true
    }

    /// Post the confirmation pairs and retire the route once the deposit's
    /// target is met.
    fn confirm_payment(
        &self,
        payment: &Payment,
        route: &Route,
        network: NetworkKind,
    ) -> Result<(), SettlementError> {
        let deposit = self
            .deposits
            .get(payment.deposit_id)
            .ok_or_else(|| SettlementError::DepositNotFound(payment.deposit_id.to_string()))?;
        self.orchestrator
            .on_payment_confirmed(&deposit, payment.id, &payment.amount, network)?;

        // Open-ended deposits keep accepting; targeted ones retire the
        // route once the confirmed total covers the target.
        if let Some(target) = deposit.target_value() {
            let confirmed_total = self.total_confirmed(deposit.id) + payment.amount.value;
            if confirmed_total >= target {
                self.allocator.mark_used(route.id);
            }
        }
        Ok(())
    }

    /// Undo everything above a regressed chain height: blocks, payments,
    /// confirmations, and the ledger pairs the confirmations posted.
    pub fn rollback(&self, chain_id: u64, new_height: u64) {
        let old = self.cursor(chain_id);
        if new_height >= old {
            return;
        }
        tracing::warn!(chain_id, old, new_height, "chain reorganization, rolling back");

        self.blocks
            .retain(|(c, number), _| *c != chain_id || *number <= new_height);

        let orphaned: Vec<Payment> = self
            .payments
            .iter()
            .filter(|kv| {
                matches!(&kv.origin, PaymentOrigin::Blockchain { chain_id: c, .. } if *c == chain_id)
                    && kv.block_number.map(|b| b > new_height).unwrap_or(false)
            })
            .map(|kv| kv.clone())
            .collect();

        let mut affected: HashSet<RouteId> = HashSet::new();
        for payment in orphaned {
            if payment.status == PaymentStatus::Confirmed {
                self.orchestrator.on_payment_reverted(payment.id);
            }
            if let PaymentOrigin::Blockchain { chain_id, tx_hash } = &payment.origin {
                self.seen_chain.remove(&(*chain_id, tx_hash.clone()));
            }
            self.payments.remove(&payment.id);
            affected.insert(payment.route_id);
        }

        // Routes retired by a now-invalidated confirmation reopen, so the
        // payment can match again once the canonical chain carries it.
        let now = Utc::now();
        for route_id in affected {
            let Some(route) = self.allocator.route(route_id) else {
                continue;
            };
            if route.is_expired(new_height, now) {
                continue;
            }
            let target_met = self
                .deposits
                .get(route.deposit_id)
                .and_then(|d| d.target_value())
                .map(|target| self.total_confirmed(route.deposit_id) >= target)
                .unwrap_or(false);
            if !target_met {
                self.allocator.mark_unused(route_id);
            }
        }

        // Receipts not yet confirmed re-settle when the transaction is
        // mined again.
        self.outbound
            .retain(|_, (c, b)| *c != chain_id || *b <= new_height);

        self.cursors.insert(chain_id, new_height);
    }

    /// Total value of confirmed payments for a deposit.
    pub fn total_confirmed(&self, deposit_id: DepositId) -> u128 {
        self.payments
            .iter()
            .filter(|kv| kv.deposit_id == deposit_id && kv.status == PaymentStatus::Confirmed)
            .map(|kv| kv.amount.value)
            .sum()
    }

    /// Total value of settled-or-better payments for a deposit.
    pub fn total_paid(&self, deposit_id: DepositId) -> u128 {
        self.payments
            .iter()
            .filter(|kv| kv.deposit_id == deposit_id && kv.status != PaymentStatus::Seen)
            .map(|kv| kv.amount.value)
            .sum()
    }

    /// Derive where a deposit stands from its payments and routes.
    pub fn deposit_status(&self, deposit: &Deposit, chain_height: u64) -> DepositStatus {
        let confirmed = self.total_confirmed(deposit.id);
        let paid = self.total_paid(deposit.id);

        match deposit.target_value() {
            Some(target) => {
                if confirmed >= target {
                    DepositStatus::Confirmed
                } else if paid >= target {
                    DepositStatus::Paid
                } else {
                    let routes = self.allocator.routes_for_deposit(deposit.id);
                    let now = Utc::now();
                    if !routes.is_empty()
                        && routes.iter().all(|r| r.is_expired(chain_height, now))
                    {
                        DepositStatus::Expired
                    } else {
                        DepositStatus::Open
                    }
                }
            }
            None => {
                if confirmed > 0 {
                    DepositStatus::Confirmed
                } else {
                    DepositStatus::Open
                }
            }
        }
    }
}
