//! Double-entry ledger for the hub.
//!
//! Every movement of value is a debit/credit pair between two books of the
//! same token, posted atomically. Entries are immutable and carry the
//! domain record that caused them; corrections are compensating pairs.

pub mod accounts;
pub mod entry;
pub mod error;
pub mod ledger;

pub use accounts::{AccountId, Accounts};
pub use entry::{BookKey, Entry, EntryKind, Reference};
pub use error::LedgerError;
pub use ledger::{Ledger, TokenSheet};
