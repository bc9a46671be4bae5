//! Hub-wide event bus.
//!
//! Components publish domain events after their own bookkeeping succeeds;
//! subscribers react out-of-band (notifications, webhooks, metrics).
//! Delivery is at-least-once within the process, so handlers must be
//! idempotent.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::state_machine::TransferState;
use crate::types::{DepositId, NetworkKind, PaymentId, RouteId, TokenAmount, TransferId};

/// Domain events published on the hub bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HubEvent {
    /// A deposit request was created and is accepting routes.
    DepositCreated { deposit_id: DepositId },

    /// An inbound payment was matched against a deposit route.
    DepositReceived {
        deposit_id: DepositId,
        payment_id: PaymentId,
        amount: TokenAmount,
    },

    /// An inbound payment reached its confirmation threshold.
    PaymentConfirmed {
        deposit_id: DepositId,
        payment_id: PaymentId,
    },

    /// An inbound payment was invalidated by a chain reorganization.
    PaymentReverted { payment_id: PaymentId },

    /// A payment route expired without being used.
    RouteExpired { route_id: RouteId },

    /// An outbound transfer moved to a new state.
    TransferStateChanged {
        transfer_id: TransferId,
        state: TransferState,
    },

    /// A network provider became reachable.
    ProviderOnline { network: NetworkKind },

    /// A network provider became unreachable.
    ProviderOffline { network: NetworkKind },

    /// A provider finished catching up with its network.
    ProviderSynced { network: NetworkKind },

    /// A new block was processed on a chain.
    BlockSealed { chain_id: u64, number: u64 },
}

/// Broadcast-based event bus shared by hub components.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HubEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers that will see it;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: HubEvent) -> usize {
        tracing::debug!(event = ?event, "publishing hub event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
