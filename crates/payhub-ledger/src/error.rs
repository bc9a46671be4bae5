/// Ledger errors.
///
/// Validation failures are raised before any entry is written; a failed
/// posting leaves both books untouched.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("book {book} holds {book_token}, cannot post {entry_token}")]
    CurrencyMismatch {
        book: String,
        book_token: String,
        entry_token: String,
    },

    #[error("duplicate posting for reference {0}")]
    DuplicateReference(String),

    #[error("user {0} already exists")]
    UserExists(String),

    #[error("debit and credit books must differ, got {0} twice")]
    SelfPosting(String),
}
