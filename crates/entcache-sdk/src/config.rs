use std::time::Duration;

use entcache_schema::UnionPolicy;
use serde::{Deserialize, Serialize};

use crate::error::SdkResult;

/// Client-wide settings. Every field has a default, so a partial TOML
/// document is enough.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Freshness window for queries that do not set their own.
    pub default_stale_time_ms: u64,
    /// How long a released query stays cached.
    pub default_cache_time_ms: u64,
    /// Delay before a deferred garbage collection pass is retried.
    pub gc_retry_delay_ms: u64,
    pub union_policy: UnionPolicy,
    /// Change batches buffered per subscriber.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_stale_time_ms: 0,
            default_cache_time_ms: 0,
            gc_retry_delay_ms: 1000,
            union_policy: UnionPolicy::FirstStructured,
            event_capacity: 1024,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn default_stale_time(&self) -> Duration {
        Duration::from_millis(self.default_stale_time_ms)
    }

    pub fn default_cache_time(&self) -> Duration {
        Duration::from_millis(self.default_cache_time_ms)
    }

    pub fn gc_retry_delay(&self) -> Duration {
        Duration::from_millis(self.gc_retry_delay_ms)
    }
}
