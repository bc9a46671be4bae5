use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use payhub_core::types::{NetworkKind, UserId};

use crate::error::LedgerError;

/// The holder of a set of books.
///
/// The treasury is the hub's own position. One clearing account exists per
/// payment network, created lazily on first posting. User accounts are
/// created when the user registers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountId {
    /// The hub's own funds.
    Treasury,
    /// Clearing account for one payment network.
    Network(NetworkKind),
    /// A registered user's account.
    User(UserId),
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Treasury => write!(f, "treasury"),
            Self::Network(kind) => write!(f, "network:{}", kind),
            Self::User(user) => write!(f, "user:{}", user),
        }
    }
}

/// Registry of user accounts.
///
/// Treasury and network accounts need no registration; their books appear on
/// first use. User accounts must exist before the ledger will accept
/// postings against them.
#[derive(Debug, Default)]
pub struct Accounts {
    users: DashMap<UserId, DateTime<Utc>>,
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, creating their account. Registering an existing
    /// user is an error.
    pub fn create_user(&self, name: impl Into<String>) -> Result<UserId, LedgerError> {
        let user = UserId(name.into());
        if self.users.contains_key(&user) {
            return Err(LedgerError::UserExists(user.to_string()));
        }
        self.users.insert(user.clone(), Utc::now());
        tracing::info!(user = %user, "user account created");
        Ok(user)
    }

    /// Whether the given user is registered.
    pub fn user_exists(&self, user: &UserId) -> bool {
        self.users.contains_key(user)
    }

    /// Whether postings against this account are acceptable.
    pub fn account_exists(&self, account: &AccountId) -> bool {
        match account {
            AccountId::Treasury | AccountId::Network(_) => true,
            AccountId::User(user) => self.user_exists(user),
        }
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
