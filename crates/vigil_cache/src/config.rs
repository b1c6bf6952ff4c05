//! Cache configuration.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Configuration for the request cache.
///
/// # Examples
///
/// ```
/// use vigil_cache::{CacheConfig, CacheConfigBuilder};
///
/// let config = CacheConfigBuilder::default()
///     .default_ttl_secs(60u64)
///     .max_entries(10usize)
///     .enabled(true)
///     .build()
///     .unwrap();
/// assert_eq!(*config.default_ttl_secs(), 60);
///
/// let tuned = CacheConfig::default().with_max_entries(50);
/// assert_eq!(*tuned.max_entries(), 50);
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
pub struct CacheConfig {
    /// Default TTL for cached entries (seconds)
    #[serde(default = "default_ttl_secs")]
    default_ttl_secs: u64,

    /// Maximum number of cached entries
    #[serde(default = "default_max_entries")]
    max_entries: usize,

    /// Whether caching is enabled
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_max_entries() -> usize {
    1000
}

fn default_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            enabled: default_enabled(),
        }
    }
}
