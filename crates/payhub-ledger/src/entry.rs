use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use payhub_core::types::{PaymentId, Token, TransferId};

use crate::accounts::AccountId;

/// One side of a book: an account's position in one token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookKey {
    /// The account holding the book.
    pub account: AccountId,
    /// The token the book counts.
    pub token: Token,
}

impl BookKey {
    pub fn new(account: AccountId, token: Token) -> Self {
        Self { account, token }
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.token)
    }
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Increases the book's balance.
    Credit,
    /// Decreases the book's balance.
    Debit,
}

/// The domain record that caused a ledger pair.
///
/// Every entry names its cause; entries are never posted bare. Uniqueness
/// on `(book, reference, kind)` makes replayed postings detectable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reference {
    /// Funds reserved when an outbound transfer was created.
    Transfer(TransferId),
    /// Reservation returned after a failed or canceled transfer.
    TransferReversal(TransferId),
    /// Network fee charged for a confirmed transfer.
    TransferFee(TransferId),
    /// An inbound payment reached its confirmation threshold.
    PaymentConfirmation(PaymentId),
    /// Hub-to-depositor leg of a confirmed inbound payment.
    PaymentCredit(PaymentId),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer(id) => write!(f, "transfer:{}", id),
            Self::TransferReversal(id) => write!(f, "transfer-reversal:{}", id),
            Self::TransferFee(id) => write!(f, "transfer-fee:{}", id),
            Self::PaymentConfirmation(id) => write!(f, "payment-confirmation:{}", id),
            Self::PaymentCredit(id) => write!(f, "payment-credit:{}", id),
        }
    }
}

/// An immutable ledger row. Ordinary flows only ever append these;
/// corrections are compensating pairs, not edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique ID for this entry.
    pub id: Uuid,
    /// The book this entry is posted to.
    pub book: BookKey,
    /// Credit or debit.
    pub kind: EntryKind,
    /// Value in the book token's atomic units.
    pub value: u128,
    /// The domain record that caused this entry.
    pub reference: Reference,
    /// When the entry was posted.
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// The entry's effect on its book balance: positive for credits,
    /// negative for debits.
    pub fn delta(&self) -> i128 {
        match self.kind {
            EntryKind::Credit => self.value as i128,
            EntryKind::Debit => -(self.value as i128),
        }
    }
}
