//! Background worker passes.
//!
//! Each pass is one bounded unit of work against one provider: pull sealed
//! blocks, detect height regressions, retire expired routes, or execute
//! scheduled transfers. The node runs them on timers; every pass is safe to
//! repeat, so an aborted one simply leaves work for the next tick.

use chrono::Utc;
use std::sync::Arc;

use payhub_core::config::HubConfig;
use payhub_core::events::{EventBus, HubEvent};
use payhub_routing::RouteAllocator;

use crate::error::SettlementError;
use crate::lock::{ProviderLock, TtlCache};
use crate::provider::NetworkProvider;
use crate::tracker::ConfirmationTracker;
use crate::transfer::TransferManager;

/// Pull sealed blocks from the provider into the tracker, at most
/// `block_scan_range` per pass. Skips the pass when another worker holds
/// the sync lock for this provider.
pub async fn sync_blocks(
    provider: &dyn NetworkProvider,
    tracker: &ConfirmationTracker,
    locks: &Arc<TtlCache>,
    config: &HubConfig,
) -> Result<(), SettlementError> {
    let Some(lock) = ProviderLock::acquire(
        locks.clone(),
        provider.hostname(),
        "sync_blocks",
        config.provider_lock_ttl(),
    ) else {
        tracing::debug!(hostname = provider.hostname(), "sync already running, skipping");
        return Ok(());
    };

    let result = pull_blocks(provider, tracker, config, &lock).await;
    lock.release();
    result
}

async fn pull_blocks(
    provider: &dyn NetworkProvider,
    tracker: &ConfirmationTracker,
    config: &HubConfig,
    lock: &ProviderLock,
) -> Result<(), SettlementError> {
    let chain_id = provider.chain_id();
    let height = provider.current_height().await?;
    let cursor = tracker.cursor(chain_id);
    if height <= cursor {
        return Ok(());
    }

    let target = height.min(cursor + config.block_scan_range);
    tracing::debug!(chain_id, cursor, target, "pulling blocks");
    for number in (cursor + 1)..=target {
        if !lock.refresh() {
            tracing::warn!(chain_id, number, "sync lock lost, ending pass");
            break;
        }
        match provider.get_block(number).await? {
            Some(block) => tracker.process_block(&block)?,
            // The node does not have the block yet; pick it up next pass.
            None => break,
        }
    }
    Ok(())
}

/// Detect a height regression and roll the tracker back to the node's
/// reported height.
pub async fn check_reorg(
    provider: &dyn NetworkProvider,
    tracker: &ConfirmationTracker,
) -> Result<(), SettlementError> {
    let chain_id = provider.chain_id();
    let height = provider.current_height().await?;
    if height < tracker.cursor(chain_id) {
        tracker.rollback(chain_id, height);
    }
    Ok(())
}

/// Retire routes whose window passed without payment and announce each
/// one once.
pub fn expire_routes(allocator: &RouteAllocator, bus: &EventBus, chain_height: u64) {
    for route_id in allocator.expired_unused_routes(chain_height, Utc::now()) {
        allocator.mark_used(route_id);
        tracing::info!(route_id = %route_id, "payment route expired");
        bus.publish(HubEvent::RouteExpired { route_id });
    }
}

/// Execute every transfer scheduled on the provider's network. A provider
/// outage ends the pass early; the remaining transfers stay scheduled.
pub async fn execute_pending(
    manager: &TransferManager,
    provider: &dyn NetworkProvider,
) -> Result<usize, SettlementError> {
    let mut executed = 0;
    for id in manager.scheduled(provider.network()) {
        match manager.execute(id, provider).await {
            Ok(_) => executed += 1,
            Err(SettlementError::Provider(e)) => {
                tracing::warn!(error = %e, "provider unavailable, ending execution pass");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(executed)
}
