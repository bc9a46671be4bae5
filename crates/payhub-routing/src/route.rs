use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use payhub_core::types::{Address, DepositId, NetworkKind, RouteId, Token};

/// Network-specific details of a payment route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteDescriptor {
    /// Book transfer inside the hub. Always open, never expires.
    Internal,
    /// An operator address watched for on-chain transfers during a block
    /// window.
    Blockchain {
        /// The receiving operator address.
        address: Address,
        /// First block of the validity window.
        start_block: u64,
        /// Last block of the validity window (inclusive).
        expiration_block: u64,
    },
    /// A channel node that accepts payments tagged with the route
    /// identifier until the deadline.
    Channel {
        /// The receiving channel node.
        node_id: String,
        /// When the route stops accepting payments.
        expires_at: DateTime<Utc>,
    },
}

impl RouteDescriptor {
    /// The network this descriptor belongs to.
    pub fn network(&self) -> NetworkKind {
        match self {
            Self::Internal => NetworkKind::Internal,
            Self::Blockchain { .. } => NetworkKind::Blockchain,
            Self::Channel { .. } => NetworkKind::Channel,
        }
    }
}

/// A route allocated for one deposit on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Route identifier, also used as the payment tag on channel networks.
    pub id: RouteId,
    /// The deposit this route collects for.
    pub deposit_id: DepositId,
    /// The token the route accepts.
    pub token: Token,
    /// Network-specific details.
    pub descriptor: RouteDescriptor,
    /// When the route was allocated.
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// The network this route settles over.
    pub fn network(&self) -> NetworkKind {
        self.descriptor.network()
    }

    /// Whether the route's validity window has passed.
    pub fn is_expired(&self, chain_height: u64, now: DateTime<Utc>) -> bool {
        match &self.descriptor {
            RouteDescriptor::Internal => false,
            RouteDescriptor::Blockchain {
                expiration_block, ..
            } => chain_height > *expiration_block,
            RouteDescriptor::Channel { expires_at, .. } => now > *expires_at,
        }
    }

    /// Whether a block number falls inside a blockchain route's window.
    /// Non-blockchain routes have no window.
    pub fn window_contains(&self, block_number: u64) -> bool {
        match &self.descriptor {
            RouteDescriptor::Blockchain {
                start_block,
                expiration_block,
                ..
            } => (*start_block..=*expiration_block).contains(&block_number),
            _ => false,
        }
    }
}
