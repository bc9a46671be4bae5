//! Contract between the hub and external network nodes.
//!
//! Providers are the only components that talk to the outside world. They
//! surface observations (blocks, transactions, sync state) and carry out
//! submissions; all interpretation happens in the tracker and executor.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use payhub_core::events::{EventBus, HubEvent};
use payhub_core::types::{Address, NetworkKind, Token, TokenAmount};

/// Why a provider call failed.
///
/// `Connection` and `UnsupportedMethod` abort the current unit of work
/// without touching domain records; the next trigger retries. Rejections
/// are definitive answers from the network about one transaction.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider connection failed: {0}")]
    Connection(String),

    #[error("provider does not support {0}")]
    UnsupportedMethod(String),

    #[error("transaction rejected: nonce too low")]
    NonceTooLow,

    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// A transaction observed in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    /// Transaction hash, unique per chain.
    pub hash: String,
    /// Sending address.
    pub from: Address,
    /// Receiving address, absent for contract creations.
    pub to: Option<Address>,
    /// The token moved. Providers decode contract transfers into this.
    pub token: Token,
    /// Value moved, in the token's atomic units.
    pub value: u128,
}

/// A sealed block with its value-moving transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    /// Chain the block belongs to.
    pub chain_id: u64,
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: String,
    /// Decoded transactions.
    pub transactions: Vec<TxData>,
}

/// An outbound transaction to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundTx {
    /// Sending operator wallet. Channel networks manage their own funds
    /// and take no sender.
    pub from: Option<Address>,
    /// Destination address.
    pub to: Address,
    /// Amount to move.
    pub amount: TokenAmount,
    /// Account nonce for the sending wallet, when one applies.
    pub nonce: Option<u64>,
    /// Payment identifier tag, used by channel networks.
    pub identifier: Option<u64>,
}

/// A node client for one payment network.
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// The network this provider serves.
    fn network(&self) -> NetworkKind;

    /// Chain identifier, for providers that follow a chain.
    fn chain_id(&self) -> u64;

    /// Hostname of the node, used for the per-provider task lock.
    fn hostname(&self) -> &str;

    /// Highest block the node knows about.
    async fn current_height(&self) -> Result<u64, ProviderError>;

    /// Fetch one block with decoded transactions. `None` when the node
    /// does not have it yet.
    async fn get_block(&self, number: u64) -> Result<Option<BlockData>, ProviderError>;

    /// Whether the node has caught up with its network.
    async fn is_synced(&self) -> Result<bool, ProviderError>;

    /// Balance of an address in one token.
    async fn balance_of(&self, address: &Address, token: &Token) -> Result<u128, ProviderError>;

    /// Next account nonce for an operator wallet.
    async fn next_nonce(&self, address: &Address) -> Result<u64, ProviderError>;

    /// Submit a transaction, returning its hash or identifier.
    async fn submit(&self, tx: OutboundTx) -> Result<String, ProviderError>;
}

/// Liveness flags for one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStatus {
    pub connected: bool,
    pub synced: bool,
}

/// Tracks provider health and announces transitions on the bus.
pub struct ProviderRegistry {
    statuses: DashMap<NetworkKind, ProviderStatus>,
    bus: EventBus,
}

impl ProviderRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            statuses: DashMap::new(),
            bus,
        }
    }

    /// Current status of a network's provider.
    pub fn status(&self, network: NetworkKind) -> ProviderStatus {
        self.statuses
            .get(&network)
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Record connectivity, publishing on change.
    pub fn set_connected(&self, network: NetworkKind, connected: bool) {
        let mut status = self.statuses.entry(network).or_default();
        if status.connected != connected {
            status.connected = connected;
            if !connected {
                status.synced = false;
            }
            let event = if connected {
                HubEvent::ProviderOnline { network }
            } else {
                HubEvent::ProviderOffline { network }
            };
            tracing::info!(network = %network, connected, "provider connectivity changed");
            self.bus.publish(event);
        }
    }

    /// Record sync state, publishing when the provider catches up.
    pub fn set_synced(&self, network: NetworkKind, synced: bool) {
        let mut status = self.statuses.entry(network).or_default();
        if status.synced != synced {
            status.synced = synced;
            if synced {
                tracing::info!(network = %network, "provider synced");
                self.bus.publish(HubEvent::ProviderSynced { network });
            }
        }
    }

    /// Run one health check against a provider and record the outcome.
    pub async fn check(&self, provider: &Arc<dyn NetworkProvider>) {
        let network = provider.network();
        match provider.is_synced().await {
            Ok(synced) => {
                self.set_connected(network, true);
                self.set_synced(network, synced);
            }
            Err(e) => {
                tracing::warn!(network = %network, error = %e, "provider health check failed");
                self.set_connected(network, false);
            }
        }
    }
}
