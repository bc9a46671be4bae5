use chrono::Utc;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use payhub_core::types::{Token, TokenAmount};

use crate::accounts::AccountId;
use crate::entry::{BookKey, Entry, EntryKind, Reference};
use crate::error::LedgerError;

/// Per-token totals across all books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenSheet {
    /// Sum of all credits in atomic units.
    pub credits: u128,
    /// Sum of all debits in atomic units.
    pub debits: u128,
}

/// Append-only entry log plus the duplicate index it maintains.
#[derive(Debug, Default)]
struct Log {
    entries: Vec<Entry>,
    seen: HashSet<(BookKey, Reference, EntryKind)>,
}

/// The double-entry ledger.
///
/// Every posting is a pair: one debit and one credit of the same value and
/// token, written in one critical section so no reader observes half a
/// posting. Balances are `credits − debits` per book; a balance index is
/// kept alongside the log so reads do not take the log lock.
#[derive(Debug, Default)]
pub struct Ledger {
    log: Mutex<Log>,
    balances: DashMap<BookKey, i128>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a debit/credit pair between two books.
    ///
    /// Both books must carry the amount's token, the books must differ, and
    /// neither side of the pair may already exist for this reference. Any
    /// failure leaves the ledger untouched.
    pub fn post_pair(
        &self,
        debit_book: BookKey,
        credit_book: BookKey,
        amount: &TokenAmount,
        reference: Reference,
    ) -> Result<(), LedgerError> {
        for book in [&debit_book, &credit_book] {
            if book.token != amount.token {
                return Err(LedgerError::CurrencyMismatch {
                    book: book.to_string(),
                    book_token: book.token.symbol.clone(),
                    entry_token: amount.token.symbol.clone(),
                });
            }
        }
        if debit_book == credit_book {
            return Err(LedgerError::SelfPosting(debit_book.to_string()));
        }

        let debit_key = (debit_book.clone(), reference.clone(), EntryKind::Debit);
        let credit_key = (credit_book.clone(), reference.clone(), EntryKind::Credit);

        let mut log = self.log.lock().expect("ledger log poisoned");
        if log.seen.contains(&debit_key) || log.seen.contains(&credit_key) {
            return Err(LedgerError::DuplicateReference(reference.to_string()));
        }

        let now = Utc::now();
        let debit = Entry {
            id: Uuid::now_v7(),
            book: debit_book.clone(),
            kind: EntryKind::Debit,
            value: amount.value,
            reference: reference.clone(),
            created_at: now,
        };
        let credit = Entry {
            id: Uuid::now_v7(),
            book: credit_book.clone(),
            kind: EntryKind::Credit,
            value: amount.value,
            reference: reference.clone(),
            created_at: now,
        };

        log.seen.insert(debit_key);
        log.seen.insert(credit_key);
        log.entries.push(debit);
        log.entries.push(credit);

        *self.balances.entry(debit_book.clone()).or_insert(0) -= amount.value as i128;
        *self.balances.entry(credit_book.clone()).or_insert(0) += amount.value as i128;

        tracing::debug!(
            debit = %debit_book,
            credit = %credit_book,
            value = amount.value,
            reference = %reference,
            "posted ledger pair"
        );
        Ok(())
    }

    /// Post a pair between two accounts, building the book keys from the
    /// amount's token.
    pub fn post(
        &self,
        debit: AccountId,
        credit: AccountId,
        amount: &TokenAmount,
        reference: Reference,
    ) -> Result<(), LedgerError> {
        self.post_pair(
            BookKey::new(debit, amount.token.clone()),
            BookKey::new(credit, amount.token.clone()),
            amount,
            reference,
        )
    }

    /// Balance of one account in one token: `Σcredits − Σdebits`.
    pub fn balance(&self, account: &AccountId, token: &Token) -> i128 {
        let key = BookKey::new(account.clone(), token.clone());
        self.balances.get(&key).map(|v| *v).unwrap_or(0)
    }

    /// All non-zero token balances of one account.
    pub fn balances(&self, account: &AccountId) -> HashMap<Token, i128> {
        self.balances
            .iter()
            .filter(|kv| &kv.key().account == account && *kv.value() != 0)
            .map(|kv| (kv.key().token.clone(), *kv.value()))
            .collect()
    }

    /// Per-token credit and debit totals across all books.
    pub fn balance_sheet(&self) -> HashMap<Token, TokenSheet> {
        let log = self.log.lock().expect("ledger log poisoned");
        let mut sheet: HashMap<Token, TokenSheet> = HashMap::new();
        for entry in &log.entries {
            let row = sheet.entry(entry.book.token.clone()).or_default();
            match entry.kind {
                EntryKind::Credit => row.credits += entry.value,
                EntryKind::Debit => row.debits += entry.value,
            }
        }
        sheet
    }

    /// Whether every token's credits equal its debits. Holds unconditionally
    /// because postings are pairs; a `false` here means corruption.
    pub fn is_balanced(&self) -> bool {
        self.balance_sheet()
            .values()
            .all(|row| row.credits == row.debits)
    }

    /// All entries posted against one account, oldest first.
    pub fn entries(&self, account: &AccountId) -> Vec<Entry> {
        let log = self.log.lock().expect("ledger log poisoned");
        log.entries
            .iter()
            .filter(|e| &e.book.account == account)
            .cloned()
            .collect()
    }

    /// Total number of entries in the log.
    pub fn entry_count(&self) -> usize {
        self.log.lock().expect("ledger log poisoned").entries.len()
    }

    /// Remove every entry posted under the given reference and undo its
    /// balance effect.
    ///
    /// This is the single deletion path in the ledger, reserved for the
    /// chain-reorganization cascade: the confirmations those pairs recorded
    /// no longer exist on any chain. Everything else corrects with a
    /// compensating pair. Returns the number of entries removed.
    pub fn unwind(&self, reference: &Reference) -> usize {
        let mut log = self.log.lock().expect("ledger log poisoned");
        let mut removed = 0;
        log.entries.retain(|entry| {
            if &entry.reference == reference {
                *self
                    .balances
                    .entry(entry.book.clone())
                    .or_insert(0) -= entry.delta();
                removed += 1;
                false
            } else {
                true
            }
        });
        log.seen
            .retain(|(_, seen_ref, _)| seen_ref != reference);

        if removed > 0 {
            tracing::warn!(reference = %reference, removed, "unwound ledger entries");
        }
        removed
    }
}
