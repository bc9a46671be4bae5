use payhub_core::types::NetworkKind;

/// Routing errors. A failed allocation leaves the deposit without that
/// route; it does not touch the deposit itself.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("chain provider is not synced, refusing to open a blockchain route")]
    ChainNotSynced,

    #[error("no online channel node has capacity for {token}")]
    NoFundedChannel { token: String },

    #[error("deposit already has an open {network} route")]
    RouteConflict { network: NetworkKind },

    #[error("checkout references unknown store {0}")]
    StoreNotFound(String),
}
