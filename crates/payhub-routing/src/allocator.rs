use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use rand::seq::SliceRandom;
use std::sync::Arc;

use payhub_core::config::HubConfig;
use payhub_core::types::{Address, DepositId, NetworkKind, RouteId, Token};

use crate::channels::ChannelRegistry;
use crate::deposit::Deposit;
use crate::error::RoutingError;
use crate::route::{Route, RouteDescriptor};
use crate::wallets::WalletPool;

/// Allocates payment routes for deposits, one open route per network per
/// deposit, and answers matching queries for the confirmation tracker.
pub struct RouteAllocator {
    config: HubConfig,
    wallets: Arc<WalletPool>,
    channels: Arc<ChannelRegistry>,
    routes: DashMap<RouteId, Route>,
    used: DashSet<RouteId>,
    // Authority on address exclusivity for blockchain routes: one claim
    // per (token, address) while the claiming route is open.
    open_addresses: DashMap<(Token, Address), RouteId>,
}

impl RouteAllocator {
    pub fn new(config: HubConfig, wallets: Arc<WalletPool>, channels: Arc<ChannelRegistry>) -> Self {
        Self {
            config,
            wallets,
            channels,
            routes: DashMap::new(),
            used: DashSet::new(),
            open_addresses: DashMap::new(),
        }
    }

    /// Allocate a route for the deposit on the given network.
    ///
    /// Blockchain routes need the provider's current height; callers pass
    /// `None` when the provider is not synced, which refuses the route
    /// rather than opening a window on stale data.
    pub fn make(
        &self,
        deposit: &Deposit,
        network: NetworkKind,
        chain_height: Option<u64>,
    ) -> Result<Route, RoutingError> {
        let now = Utc::now();
        if self
            .open_route_for(deposit.id, network, chain_height.unwrap_or(0), now)
            .is_some()
        {
            return Err(RoutingError::RouteConflict { network });
        }

        let id = RouteId::random();
        let descriptor = match network {
            NetworkKind::Internal => RouteDescriptor::Internal,
            NetworkKind::Blockchain => {
                let height = chain_height.ok_or(RoutingError::ChainNotSynced)?;
                let address = self.claim_blockchain_address(deposit, id, height, now);
                RouteDescriptor::Blockchain {
                    address,
                    start_block: height,
                    expiration_block: height + self.config.blockchain_route_lifetime_blocks,
                }
            }
            NetworkKind::Channel => {
                let funded = self
                    .channels
                    .funded_nodes(&deposit.token, deposit.target_value());
                let node_id = funded
                    .choose(&mut rand::thread_rng())
                    .cloned()
                    .ok_or_else(|| RoutingError::NoFundedChannel {
                        token: deposit.token.symbol.clone(),
                    })?;
                RouteDescriptor::Channel {
                    node_id,
                    expires_at: now
                        + chrono::Duration::seconds(self.config.channel_route_lifetime_secs as i64),
                }
            }
        };

        let route = Route {
            id,
            deposit_id: deposit.id,
            token: deposit.token.clone(),
            descriptor,
            created_at: now,
        };
        tracing::info!(
            route_id = %route.id,
            deposit_id = %deposit.id,
            network = %network,
            "allocated payment route"
        );
        self.routes.insert(route.id, route.clone());
        Ok(route)
    }

    /// Claim a receiving address for a new route. The claim map is what
    /// makes exclusivity hold under concurrent allocation: a candidate is
    /// only handed out after an insert-if-absent on (token, address)
    /// succeeds, so two racing `make` calls cannot share an address even
    /// before either route is registered.
    fn claim_blockchain_address(
        &self,
        deposit: &Deposit,
        route_id: RouteId,
        chain_height: u64,
        now: DateTime<Utc>,
    ) -> Address {
        let mut contended: Vec<Address> = Vec::new();
        loop {
            let candidate = self.pick_blockchain_address(deposit, chain_height, now, &contended);
            match self
                .open_addresses
                .entry((deposit.token.clone(), candidate.clone()))
            {
                Entry::Vacant(slot) => {
                    slot.insert(route_id);
                    return candidate;
                }
                Entry::Occupied(mut slot) => {
                    // A claim left behind by a closed route is taken over
                    // in place. A holder with no registered route yet is
                    // an allocation in flight, so the address is taken.
                    let holder_open = self
                        .route(*slot.get())
                        .map(|r| self.is_open(&r, chain_height, now))
                        .unwrap_or(true);
                    if !holder_open {
                        slot.insert(route_id);
                        return candidate;
                    }
                    contended.push(candidate);
                }
            }
        }
    }

    /// Pick a candidate address: a random operator wallet with no open
    /// blockchain route for this token, or a fresh wallet when every
    /// existing one is busy.
    fn pick_blockchain_address(
        &self,
        deposit: &Deposit,
        chain_height: u64,
        now: DateTime<Utc>,
        skip: &[Address],
    ) -> Address {
        let busy: Vec<Address> = self
            .routes
            .iter()
            .filter(|kv| {
                kv.token == deposit.token && self.is_open(kv.value(), chain_height, now)
            })
            .filter_map(|kv| match &kv.descriptor {
                RouteDescriptor::Blockchain { address, .. } => Some(address.clone()),
                _ => None,
            })
            .collect();

        let eligible: Vec<Address> = self
            .wallets
            .addresses()
            .into_iter()
            .filter(|a| !busy.contains(a) && !skip.contains(a))
            .collect();

        match eligible.choose(&mut rand::thread_rng()) {
            Some(address) => address.clone(),
            None => self.wallets.generate(),
        }
    }

    /// Whether a route is still accepting payments.
    pub fn is_open(&self, route: &Route, chain_height: u64, now: DateTime<Utc>) -> bool {
        !self.used.contains(&route.id) && !route.is_expired(chain_height, now)
    }

    /// Mark a route as used once its deposit target is met.
    pub fn mark_used(&self, route_id: RouteId) {
        self.used.insert(route_id);
    }

    /// Reopen a route whose retiring confirmation was invalidated, so the
    /// same payment can match again once the canonical chain carries it.
    pub fn mark_unused(&self, route_id: RouteId) {
        self.used.remove(&route_id);
    }

    /// Look up a route by id.
    pub fn route(&self, route_id: RouteId) -> Option<Route> {
        self.routes.get(&route_id).map(|r| r.clone())
    }

    /// All routes allocated for a deposit.
    pub fn routes_for_deposit(&self, deposit_id: DepositId) -> Vec<Route> {
        self.routes
            .iter()
            .filter(|kv| kv.deposit_id == deposit_id)
            .map(|kv| kv.clone())
            .collect()
    }

    /// The deposit's open route on one network, if any.
    pub fn open_route_for(
        &self,
        deposit_id: DepositId,
        network: NetworkKind,
        chain_height: u64,
        now: DateTime<Utc>,
    ) -> Option<Route> {
        self.routes
            .iter()
            .find(|kv| {
                kv.deposit_id == deposit_id
                    && kv.network() == network
                    && self.is_open(kv.value(), chain_height, now)
            })
            .map(|kv| kv.clone())
    }

    /// The open blockchain route receiving at `address` whose window
    /// contains `block_number`, if any.
    pub fn match_blockchain(
        &self,
        address: &Address,
        block_number: u64,
        chain_height: u64,
    ) -> Option<Route> {
        let now = Utc::now();
        self.routes
            .iter()
            .find(|kv| {
                matches!(&kv.descriptor, RouteDescriptor::Blockchain { address: a, .. } if a == address)
                    && kv.window_contains(block_number)
                    && self.is_open(kv.value(), chain_height, now)
            })
            .map(|kv| kv.clone())
    }

    /// The open channel route with the given identifier, if any.
    pub fn match_channel(&self, route_id: RouteId, now: DateTime<Utc>) -> Option<Route> {
        self.routes
            .get(&route_id)
            .filter(|r| r.network() == NetworkKind::Channel && self.is_open(r, 0, now))
            .map(|r| r.clone())
    }

    /// Routes whose window has passed without the route being used.
    pub fn expired_unused_routes(&self, chain_height: u64, now: DateTime<Utc>) -> Vec<RouteId> {
        self.routes
            .iter()
            .filter(|kv| !self.used.contains(&kv.id) && kv.is_expired(chain_height, now))
            .map(|kv| kv.id)
            .collect()
    }
}
