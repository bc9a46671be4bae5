//! Payhub core: shared domain types, the transfer state machine, the hub
//! event bus, and configuration.
//!
//! Everything here is network-agnostic; the ledger, routing, and settlement
//! crates build on these types.

pub mod config;
pub mod error;
pub mod events;
pub mod state_machine;
pub mod types;

pub use config::HubConfig;
pub use error::CoreError;
pub use events::{EventBus, HubEvent};
pub use state_machine::{TransferEvent, TransferState, TransferStateMachine};
pub use types::{
    Address, DepositId, NetworkKind, PaymentId, RouteId, Store, StoreId, Token, TokenAddress,
    TokenAmount, TransferId, UserId,
};
