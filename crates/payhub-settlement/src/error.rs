use payhub_core::error::CoreError;
use payhub_ledger::error::LedgerError;

use crate::provider::ProviderError;

/// Settlement errors.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("transfer {0} not found")]
    TransferNotFound(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("deposit {0} not found")]
    DepositNotFound(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
