//! Shared fixtures for the integration scenarios: a fully wired hub and a
//! simulated chain provider.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use payhub_core::config::HubConfig;
use payhub_core::events::EventBus;
use payhub_core::types::{Address, NetworkKind, Token, UserId};
use payhub_ledger::{Accounts, Ledger};
use payhub_routing::{
    ChannelRegistry, Deposit, DepositKind, DepositRegistry, Route, RouteAllocator,
    RouteDescriptor, WalletPool,
};
use payhub_settlement::{
    BlockData, ConfirmationTracker, NetworkProvider, OutboundTx, ProviderError,
    SettlementOrchestrator, TransferManager, TtlCache, TxData,
};

pub fn eth() -> Token {
    Token::native(1, "ETH", 18)
}

/// A simulated chain: blocks are sealed on demand from a pending pool,
/// nonces and wallet balances are enforced on submit.
pub struct SimChain {
    chain_id: u64,
    height: AtomicU64,
    blocks: DashMap<u64, BlockData>,
    pending: Mutex<Vec<TxData>>,
    nonces: DashMap<Address, u64>,
    balances: DashMap<(Address, Token), u128>,
    tx_counter: AtomicU64,
}

impl SimChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            height: AtomicU64::new(0),
            blocks: DashMap::new(),
            pending: Mutex::new(Vec::new()),
            nonces: DashMap::new(),
            balances: DashMap::new(),
            tx_counter: AtomicU64::new(0),
        }
    }

    pub fn fund(&self, address: &Address, token: &Token, value: u128) {
        *self
            .balances
            .entry((address.clone(), token.clone()))
            .or_insert(0) += value;
    }

    /// Queue an inbound payment from an external sender.
    pub fn inject_payment(&self, to: &Address, token: &Token, value: u128) -> String {
        let hash = format!("0xtx{:08x}", self.tx_counter.fetch_add(1, Ordering::SeqCst));
        self.pending.lock().unwrap().push(TxData {
            hash: hash.clone(),
            from: Address::random(),
            to: Some(to.clone()),
            token: token.clone(),
            value,
        });
        hash
    }

    /// Seal the pending pool into the next block and return its number.
    pub fn seal_block(&self) -> u64 {
        let number = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        let transactions = std::mem::take(&mut *self.pending.lock().unwrap());
        for tx in &transactions {
            if let Some(to) = &tx.to {
                *self
                    .balances
                    .entry((to.clone(), tx.token.clone()))
                    .or_insert(0) += tx.value;
            }
        }
        self.blocks.insert(
            number,
            BlockData {
                chain_id: self.chain_id,
                number,
                hash: format!("0xblock{:08x}", number),
                transactions,
            },
        );
        number
    }

    pub fn seal_empty_blocks(&self, count: u64) {
        for _ in 0..count {
            self.seal_block();
        }
    }

    /// Drop every block above `height`, as a reorganization would.
    pub fn truncate(&self, height: u64) {
        self.blocks.retain(|number, _| *number <= height);
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    /// A sealed block, by number. Panics when the block does not exist.
    pub fn sealed_block(&self, number: u64) -> BlockData {
        self.blocks
            .get(&number)
            .map(|b| b.clone())
            .expect("block not sealed")
    }
}

#[async_trait]
impl NetworkProvider for SimChain {
    fn network(&self) -> NetworkKind {
        NetworkKind::Blockchain
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn hostname(&self) -> &str {
        "sim-chain"
    }

    async fn current_height(&self) -> Result<u64, ProviderError> {
        Ok(self.height())
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

        let hash = format!("0xout{:08x}", self.tx_counter.fetch_add(1, Ordering::SeqCst));
        self.pending.lock().unwrap().push(TxData {
            hash: hash.clone(),
            from,
            to: Some(tx.to),
            token: tx.amount.token.clone(),
            value: tx.amount.value,
        });
        Ok(hash)
    }
}

/// A wired hub for the scenarios.
pub struct TestHub {
    pub config: HubConfig,
    pub bus: EventBus,
    pub accounts: Arc<Accounts>,
    pub ledger: Arc<Ledger>,
    pub orchestrator: Arc<SettlementOrchestrator>,
    pub wallets: Arc<WalletPool>,
    pub channels: Arc<ChannelRegistry>,
    pub allocator: Arc<RouteAllocator>,
    pub deposits: Arc<DepositRegistry>,
    pub tracker: Arc<ConfirmationTracker>,
    pub transfers: Arc<TransferManager>,
    pub locks: Arc<TtlCache>,
}

impl TestHub {
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    pub fn with_config(config: HubConfig) -> Self {
        let bus = EventBus::new(config.event_channel_capacity);
        let accounts = Arc::new(Accounts::new());
        let ledger = Arc::new(Ledger::new());
        let orchestrator = Arc::new(SettlementOrchestrator::new(
            ledger.clone(),
            accounts.clone(),
            bus.clone(),
        ));
        let wallets = Arc::new(WalletPool::new());
        let channels = Arc::new(ChannelRegistry::new());
        let allocator = Arc::new(RouteAllocator::new(
            config.clone(),
            wallets.clone(),
            channels.clone(),
        ));
        let deposits = Arc::new(DepositRegistry::new());
        let tracker = Arc::new(ConfirmationTracker::new(
            config.clone(),
            orchestrator.clone(),
            allocator.clone(),
            deposits.clone(),
        ));
        let transfers = Arc::new(TransferManager::new(orchestrator.clone(), wallets.clone()));
        tracker.attach_transfers(transfers.clone());
        Self {
            config,
            bus,
            accounts,
            ledger,
            orchestrator,
            wallets,
            channels,
            allocator,
            deposits,
            tracker,
            transfers,
            locks: Arc::new(TtlCache::new()),
        }
    }

    /// Open a deposit with a blockchain route and return its receiving
    /// address.
    pub fn open_blockchain_deposit(
        &self,
        user: &UserId,
        kind: DepositKind,
        chain_height: u64,
    ) -> (Deposit, Route, Address) {
        let deposit = Deposit::new(user.clone(), eth(), kind);
        self.deposits.insert(deposit.clone());
        let route = self
            .allocator
            .make(&deposit, NetworkKind::Blockchain, Some(chain_height))
            .unwrap();
        let address = match &route.descriptor {
            RouteDescriptor::Blockchain { address, .. } => address.clone(),
            _ => panic!("expected blockchain route"),
        };
        (deposit, route, address)
    }

    /// Run one full worker pass against the chain.
    pub async fn run_pass(&self, chain: &SimChain) {
        payhub_settlement::sync::check_reorg(chain, &self.tracker)
            .await
            .unwrap();
        payhub_settlement::sync::sync_blocks(chain, &self.tracker, &self.locks, &self.config)
            .await
            .unwrap();
        payhub_settlement::sync::expire_routes(
            &self.allocator,
            &self.bus,
            self.tracker.cursor(chain.chain_id()),
        );
        payhub_settlement::sync::execute_pending(&self.transfers, chain)
            .await
            .unwrap();
    }
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new()
    }
}
