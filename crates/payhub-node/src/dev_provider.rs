//! A self-contained dev chain.
//!
//! Seals a block on demand from a pending pool, enforces account nonces,
//! and tracks wallet balances, which is enough to exercise the whole
//! deposit and transfer pipeline without a real node.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use payhub_core::types::{Address, NetworkKind, Token};
use payhub_settlement::{BlockData, NetworkProvider, OutboundTx, ProviderError, TxData};

pub struct DevProvider {
    chain_id: u64,
    hostname: String,
    height: AtomicU64,
    blocks: DashMap<u64, BlockData>,
    pending: Mutex<Vec<TxData>>,
    nonces: DashMap<Address, u64>,
    balances: DashMap<(Address, Token), u128>,
}

impl DevProvider {
    pub fn new(chain_id: u64, hostname: impl Into<String>) -> Self {
        Self {
            chain_id,
            hostname: hostname.into(),
            height: AtomicU64::new(0),
            blocks: DashMap::new(),
            pending: Mutex::new(Vec::new()),
            nonces: DashMap::new(),
            balances: DashMap::new(),
        }
    }

    /// Credit an address out of thin air.
    pub fn fund(&self, address: &Address, token: &Token, value: u128) {
        *self
            .balances
            .entry((address.clone(), token.clone()))
            .or_insert(0) += value;
    }

    /// Queue an inbound payment from an unknown external sender.
    pub fn inject_payment(&self, to: &Address, token: &Token, value: u128) {
        let tx = TxData {
            hash: format!("0x{:016x}", rand::random::<u64>()),
            from: Address::random(),
            to: Some(to.clone()),
            token: token.clone(),
            value,
        };
        self.pending.lock().expect("pending pool poisoned").push(tx);
    }

    /// Seal the pending pool into the next block.
    pub fn seal_block(&self) -> u64 {
        let number = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        let transactions = std::mem::take(&mut *self.pending.lock().expect("pending pool poisoned"));
        for tx in &transactions {
            if let Some(to) = &tx.to {
                *self
                    .balances
                    .entry((to.clone(), tx.token.clone()))
                    .or_insert(0) += tx.value;
            }
        }
        let block = BlockData {
            chain_id: self.chain_id,
            number,
            hash: format!("0x{:016x}", rand::random::<u64>()),
            transactions,
        };
        self.blocks.insert(number, block);
        number
    }
}

#[async_trait]
impl NetworkProvider for DevProvider {
    fn network(&self) -> NetworkKind {
        NetworkKind::Blockchain
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn current_height(&self) -> Result<u64, ProviderError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockData>, ProviderError> {
        Ok(self.blocks.get(&number).map(|b| b.clone()))
    }

    async fn is_synced(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }

    async fn balance_of(&self, address: &Address, token: &Token) -> Result<u128, ProviderError> {
        Ok(self
            .balances
            .get(&(address.clone(), token.clone()))
            .map(|v| *v)
            .unwrap_or(0))
    }

    async fn next_nonce(&self, address: &Address) -> Result<u64, ProviderError> {
        Ok(self.nonces.get(address).map(|n| *n).unwrap_or(0))
    }

    async fn submit(&self, tx: OutboundTx) -> Result<String, ProviderError> {
        let from = tx
            .from
            .ok_or_else(|| ProviderError::Rejected("missing sender".into()))?;
        let nonce = tx
            .nonce
            .ok_or_else(|| ProviderError::Rejected("missing nonce".into()))?;

        let mut expected = self.nonces.entry(from.clone()).or_insert(0);
        if nonce < *expected {
            return Err(ProviderError::NonceTooLow);
        }
        *expected = nonce + 1;
        drop(expected);

        let key = (from.clone(), tx.amount.token.clone());
        let mut balance = self.balances.entry(key).or_insert(0);
        if *balance < tx.amount.value {
            return Err(ProviderError::Rejected("insufficient funds".into()));
        }
        *balance -= tx.amount.value;
        drop(balance);

        let sealed = TxData {
            hash: format!("0x{:016x}", rand::random::<u64>()),
            from,
            to: Some(tx.to),
            token: tx.amount.token.clone(),
            value: tx.amount.value,
        };
        let hash = sealed.hash.clone();
        self.pending
            .lock()
            .expect("pending pool poisoned")
            .push(sealed);
        Ok(hash)
    }
}
