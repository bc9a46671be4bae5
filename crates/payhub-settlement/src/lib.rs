//! Settlement: inbound payment confirmation and outbound transfer
//! execution, with every balance movement posted through the ledger.

pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod provider;
pub mod sync;
pub mod tracker;
pub mod transfer;

pub use error::SettlementError;
pub use lock::{ProviderLock, TtlCache};
pub use orchestrator::SettlementOrchestrator;
pub use provider::{
    BlockData, NetworkProvider, OutboundTx, ProviderError, ProviderRegistry, ProviderStatus,
    TxData,
};
pub use tracker::{ConfirmationTracker, Payment, PaymentOrigin, PaymentStatus};
pub use transfer::{Transfer, TransferKind, TransferManager, TransferReceipt};
