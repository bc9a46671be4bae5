//! Deposit routing for the hub.
//!
//! A deposit is a request to receive a token; routes are the per-network
//! allocations that make it payable: an internal book credit, a watched
//! operator address within a block window, or a channel node within a time
//! window.

pub mod allocator;
pub mod channels;
pub mod deposit;
pub mod error;
pub mod route;
pub mod wallets;

pub use allocator::RouteAllocator;
pub use channels::{ChannelNode, ChannelRegistry};
pub use deposit::{Deposit, DepositKind, DepositRegistry, DepositStatus, StoreRegistry};
pub use error::RoutingError;
pub use route::{Route, RouteDescriptor};
pub use wallets::{Wallet, WalletPool};
