//! Advisory per-provider task locks.
//!
//! Background workers hold one lock per (provider, task) pair so two
//! instances of the same pass do not hammer the same node. Losing the lock
//! never aborts in-flight work; idempotent payment matching makes duplicate
//! processing harmless.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-process cache with per-key TTLs and holder tokens.
#[derive(Debug, Default)]
pub struct TtlCache {
    entries: DashMap<String, (u64, Instant)>,
    next_token: AtomicU64,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry if no live one exists. Returns the holder token on
    /// success, `None` when the key is already held.
    pub fn create(&self, key: &str, ttl: Duration) -> Option<u64> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut created = false;
        let mut slot = self.entries.entry(key.to_string()).or_insert_with(|| {
            created = true;
            (token, now + ttl)
        });
        if !created {
            if slot.1 > now {
                return None;
            }
            // Expired entry, take it over.
            *slot = (token, now + ttl);
        }
        Some(token)
    }

    /// Extend the TTL, only for the current holder.
    pub fn refresh(&self, key: &str, token: u64, ttl: Duration) -> bool {
        match self.entries.get_mut(key) {
            Some(mut slot) if slot.0 == token => {
                slot.1 = Instant::now() + ttl;
                true
            }
            _ => false,
        }
    }

    /// Delete the entry, only for the current holder.
    pub fn remove(&self, key: &str, token: u64) -> bool {
        self.entries
            .remove_if(key, |_, (holder, _)| *holder == token)
            .is_some()
    }

    /// Whether a live entry exists for the key.
    pub fn contains_live(&self, key: &str) -> bool {
        self.holder(key).is_some()
    }

    /// The live entry's holder token, if any.
    pub fn holder(&self, key: &str) -> Option<u64> {
        self.entries
            .get(key)
            .filter(|slot| slot.1 > Instant::now())
            .map(|slot| slot.0)
    }
}

/// An advisory lock for one background task against one provider.
///
/// Keys are `blake3(hostname ‖ task)` so locks survive renames of either
/// part independently and stay fixed-width.
pub struct ProviderLock {
    cache: Arc<TtlCache>,
    key: String,
    token: u64,
    ttl: Duration,
}

impl ProviderLock {
    /// Derive the cache key for a (provider, task) pair.
    pub fn key_for(hostname: &str, task: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(hostname.as_bytes());
        hasher.update(task.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Try to take the lock. `None` when another holder is live.
    pub fn acquire(
        cache: Arc<TtlCache>,
        hostname: &str,
        task: &str,
        ttl: Duration,
    ) -> Option<Self> {
        let key = Self::key_for(hostname, task);
        let token = cache.create(&key, ttl)?;
        tracing::debug!(hostname, task, "acquired provider lock");
        Some(Self {
            cache,
            key,
            token,
            ttl,
        })
    }

    /// Extend the lock's TTL. Returns false when the lock was lost.
    pub fn refresh(&self) -> bool {
        self.cache.refresh(&self.key, self.token, self.ttl)
    }

    /// Whether this holder still owns the lock.
    pub fn is_acquired(&self) -> bool {
        self.cache.holder(&self.key) == Some(self.token)
    }

    /// Release the lock.
    pub fn release(self) {
        self.cache.remove(&self.key, self.token);
    }
}
