use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use payhub_core::types::{DepositId, Store, StoreId, Token, UserId};

/// What kind of inbound request a deposit is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositKind {
    /// Open-ended: any amount is accepted, the deposit never completes on
    /// its own.
    Open,
    /// A payment order for a specific value.
    Order {
        /// Target value in the deposit token's atomic units.
        value: u128,
    },
    /// An order issued by a merchant store.
    Checkout {
        /// Target value in the deposit token's atomic units.
        value: u128,
        /// The issuing store.
        store: StoreId,
    },
}

/// Where a deposit stands, derived from its payments and routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositStatus {
    /// Accepting payments.
    Open,
    /// Target reached but not all payments are confirmed yet.
    Paid,
    /// Target reached with confirmed payments.
    Confirmed,
    /// All routes expired before the target was reached.
    Expired,
}

/// A request to receive one token, owned by a user. Routes are allocated
/// against it per network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Deposit identifier.
    pub id: DepositId,
    /// The receiving user.
    pub user: UserId,
    /// The token being collected.
    pub token: Token,
    /// Open-ended, order, or checkout.
    pub kind: DepositKind,
    /// When the deposit was requested.
    pub created_at: DateTime<Utc>,
}

impl Deposit {
    /// Create a deposit request.
    pub fn new(user: UserId, token: Token, kind: DepositKind) -> Self {
        Self {
            id: DepositId::new(),
            user,
            token,
            kind,
            created_at: Utc::now(),
        }
    }

    /// Target value in atomic units, if the deposit has one.
    pub fn target_value(&self) -> Option<u128> {
        match self.kind {
            DepositKind::Open => None,
            DepositKind::Order { value } | DepositKind::Checkout { value, .. } => Some(value),
        }
    }

    /// What remains to be paid given the total already credited.
    /// Open deposits have no due amount.
    pub fn due_value(&self, paid: u128) -> Option<u128> {
        self.target_value().map(|t| t.saturating_sub(paid))
    }
}

/// Registry of live deposits.
#[derive(Debug, Default)]
pub struct DepositRegistry {
    deposits: dashmap::DashMap<DepositId, Deposit>,
}

impl DepositRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a deposit to the registry.
    pub fn insert(&self, deposit: Deposit) {
        self.deposits.insert(deposit.id, deposit);
    }

    /// Look up a deposit by id.
    pub fn get(&self, id: DepositId) -> Option<Deposit> {
        self.deposits.get(&id).map(|d| d.clone())
    }

    /// Number of registered deposits.
    pub fn len(&self) -> usize {
        self.deposits.len()
    }

    /// Whether no deposits are registered.
    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty()
    }
}

/// Registry of merchant stores. Checkout deposits must name one of these.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: dashmap::DashMap<StoreId, Store>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store for a merchant.
    pub fn create(
        &self,
        name: impl Into<String>,
        owner: UserId,
        checkout_webhook_url: Option<String>,
    ) -> Store {
        let store = Store {
            id: StoreId::new(),
            name: name.into(),
            owner,
            checkout_webhook_url,
        };
        tracing::info!(store_id = %store.id, owner = %store.owner, "store registered");
        self.stores.insert(store.id, store.clone());
        store
    }

    /// Look up a store by id.
    pub fn get(&self, id: StoreId) -> Option<Store> {
        self.stores.get(&id).map(|s| s.clone())
    }

    /// All stores owned by one merchant.
    pub fn owned_by(&self, owner: &UserId) -> Vec<Store> {
        self.stores
            .iter()
            .filter(|kv| &kv.owner == owner)
            .map(|kv| kv.clone())
            .collect()
    }
}
