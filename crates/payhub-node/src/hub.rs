//! Component wiring.

use std::sync::Arc;

use payhub_core::config::HubConfig;
use payhub_core::events::{EventBus, HubEvent};
use payhub_core::types::{NetworkKind, Token, UserId};
use payhub_ledger::{Accounts, Ledger};
use payhub_routing::{
    ChannelRegistry, Deposit, DepositKind, DepositRegistry, Route, RouteAllocator, RoutingError,
    StoreRegistry, WalletPool,
};
use payhub_settlement::{
    ConfirmationTracker, ProviderRegistry, SettlementOrchestrator, TransferManager, TtlCache,
};

/// One fully wired hub instance.
pub struct Hub {
    pub config: HubConfig,
    pub bus: EventBus,
    pub accounts: Arc<Accounts>,
    pub ledger: Arc<Ledger>,
    pub orchestrator: Arc<SettlementOrchestrator>,
    pub wallets: Arc<WalletPool>,
    pub channels: Arc<ChannelRegistry>,
    pub allocator: Arc<RouteAllocator>,
    pub deposits: Arc<DepositRegistry>,
    pub stores: Arc<StoreRegistry>,
    pub tracker: Arc<ConfirmationTracker>,
    pub transfers: Arc<TransferManager>,
    pub providers: Arc<ProviderRegistry>,
    pub locks: Arc<TtlCache>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
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
        let providers = Arc::new(ProviderRegistry::new(bus.clone()));

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
            stores: Arc::new(StoreRegistry::new()),
            tracker,
            transfers,
            providers,
            locks: Arc::new(TtlCache::new()),
        }
    }

    /// Open a deposit and allocate its first route.
    pub fn request_deposit(
        &self,
        user: UserId,
        token: Token,
        kind: DepositKind,
        network: NetworkKind,
        chain_height: Option<u64>,
    ) -> Result<(Deposit, Route), RoutingError> {
        if let DepositKind::Checkout { store, .. } = &kind {
            if self.stores.get(*store).is_none() {
                return Err(RoutingError::StoreNotFound(store.to_string()));
            }
        }
        let deposit = Deposit::new(user, token, kind);
        self.deposits.insert(deposit.clone());
        self.bus.publish(HubEvent::DepositCreated {
            deposit_id: deposit.id,
        });
        let route = self.allocator.make(&deposit, network, chain_height)?;
        Ok((deposit, route))
    }
}
