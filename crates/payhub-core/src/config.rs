use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::CoreError;

/// Hub-wide tunables, loadable from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Blocks a payment must be buried under before it is confirmed.
    pub minimum_confirmations: u64,
    /// Lifetime of a blockchain payment route, in blocks.
    pub blockchain_route_lifetime_blocks: u64,
    /// Lifetime of a channel payment route, in seconds.
    pub channel_route_lifetime_secs: u64,
    /// Maximum number of blocks scanned in one sync pass.
    pub block_scan_range: u64,
    /// TTL of the per-provider task lock, in seconds.
    pub provider_lock_ttl_secs: u64,
    /// Capacity of the hub event channel.
    pub event_channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            minimum_confirmations: 10,
            blockchain_route_lifetime_blocks: 100,
            channel_route_lifetime_secs: 15 * 60,
            block_scan_range: 5000,
            provider_lock_ttl_secs: 60,
            event_channel_capacity: 256,
        }
    }
}

impl HubConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::ConfigError(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&raw).map_err(|e| CoreError::ConfigError(e.to_string()))
    }

    /// Channel route lifetime as a Duration.
    pub fn channel_route_lifetime(&self) -> Duration {
        Duration::from_secs(self.channel_route_lifetime_secs)
    }

    /// Provider lock TTL as a Duration.
    pub fn provider_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.provider_lock_ttl_secs)
    }
}
