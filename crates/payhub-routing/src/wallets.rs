use chrono::{DateTime, Utc};
use dashmap::DashMap;

use payhub_core::types::Address;

/// An operator-controlled address.
#[derive(Debug, Clone)]
pub struct Wallet {
    /// The wallet's address.
    pub address: Address,
    /// When the wallet was generated.
    pub created_at: DateTime<Utc>,
}

/// The pool of operator wallets available for receiving and sending
/// on-chain funds. Grows on demand when no existing wallet is eligible.
#[derive(Debug, Default)]
pub struct WalletPool {
    wallets: DashMap<Address, Wallet>,
}

impl WalletPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh wallet and add it to the pool.
    pub fn generate(&self) -> Address {
        let address = Address::random();
        self.wallets.insert(
            address.clone(),
            Wallet {
                address: address.clone(),
                created_at: Utc::now(),
            },
        );
        tracing::info!(address = %address, "generated operator wallet");
        address
    }

    /// All wallet addresses in the pool.
    pub fn addresses(&self) -> Vec<Address> {
        self.wallets.iter().map(|kv| kv.key().clone()).collect()
    }

    /// Whether the given address belongs to an operator wallet.
    pub fn contains(&self, address: &Address) -> bool {
        self.wallets.contains_key(address)
    }

    /// Number of wallets in the pool.
    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
