//! Request result cache implementation.

use crate::{CacheConfig, RequestParams, fingerprint};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;
use vigil_core::{EndpointId, add_duration, remaining_secs};
use vigil_error::VigilResult;
use vigil_storage::JsonStore;

/// Cache entry with value and expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct CacheEntry {
    endpoint: EndpointId,
    fingerprint: String,
    value: JsonValue,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Check if this entry is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Get remaining time until expiration.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_expired(now) {
            None
        } else {
            Some(Duration::from_secs(remaining_secs(self.expires_at, now)))
        }
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    #[serde(default)]
    pub hits: u64,
    /// Lookups that found nothing usable
    #[serde(default)]
    pub misses: u64,
}

impl CacheStats {
    /// Share of lookups answered from the cache, 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Persisted form of the cache.
///
/// Entries are kept least recently used first so eviction order survives a
/// restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    /// Entries in access order
    #[serde(default)]
    pub entries: Vec<CacheEntry>,
    /// Counters at the time of writing
    #[serde(default)]
    pub stats: CacheStats,
}

/// Schema version of [`CacheDocument`].
const CACHE_DOCUMENT_VERSION: u32 = 1;

/// Cache for remote call results.
///
/// Stores results with TTL-based expiration. Keys are fingerprints of the
/// endpoint and its parameters. Expired entries are dropped lazily on lookup
/// and eagerly on load.
///
/// # Example
///
/// ```
/// use vigil_cache::{CacheConfig, RequestCache, RequestParams};
/// use vigil_core::EndpointId;
/// use serde_json::json;
/// use std::time::Duration;
///
/// let mut cache = RequestCache::new(CacheConfig::default());
/// let endpoint = EndpointId::from("user_lookup");
/// let mut params = RequestParams::new();
/// params.insert("username".to_string(), json!("dabit3"));
///
/// let now = chrono::Utc::now();
/// cache.insert(&endpoint, &params, json!({"id": "42"}), Some(Duration::from_secs(60)), now);
///
/// let entry = cache.get(&endpoint, &params, now).unwrap();
/// assert_eq!(entry.value(), &json!({"id": "42"}));
/// ```
#[derive(Debug)]
pub struct RequestCache {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry>,
    access_order: Vec<String>,
    stats: CacheStats,
    store: Option<JsonStore<CacheDocument>>,
}

impl RequestCache {
    /// Create an in-memory cache.
    pub fn new(config: CacheConfig) -> Self {
        tracing::debug!(
            default_ttl_secs = config.default_ttl_secs(),
            max_entries = config.max_entries(),
            enabled = config.enabled(),
            "Creating new RequestCache"
        );
        Self {
            config,
            entries: HashMap::new(),
            access_order: Vec::new(),
            stats: CacheStats::default(),
            store: None,
        }
    }

    /// Create a cache backed by the document at `path`.
    ///
    /// Entries already expired at `now` are not loaded. A missing or
    /// unreadable document starts an empty cache.
    #[tracing::instrument(skip(config, path))]
    pub fn open(
        config: CacheConfig,
        path: impl Into<std::path::PathBuf>,
        now: DateTime<Utc>,
    ) -> Self {
        let store = JsonStore::new(path, CACHE_DOCUMENT_VERSION);
        let document: CacheDocument = store.load_or_default();
        let mut cache = Self::new(config);

        let loaded = document.entries.len();
        for entry in document.entries {
            if entry.is_expired(now) {
                continue;
            }
            let key = entry.fingerprint.clone();
            cache.access_order.retain(|k| k != &key);
            cache.access_order.push(key.clone());
            cache.entries.insert(key, entry);
        }
        cache.stats = document.stats;
        while cache.entries.len() > *cache.config.max_entries() {
            cache.evict_lru();
        }

        tracing::info!(
            loaded,
            kept = cache.entries.len(),
            "Loaded request cache"
        );
        cache.store = Some(store);
        cache
    }

    /// Cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Insert a call result into the cache.
    ///
    /// `ttl` of `None` uses the configured default; a zero TTL stores nothing.
    #[tracing::instrument(
        skip(self, endpoint, params, value, now),
        fields(endpoint = %endpoint, cache_size = self.entries.len())
    )]
    pub fn insert(
        &mut self,
        endpoint: &EndpointId,
        params: &RequestParams,
        value: JsonValue,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) {
        if !self.config.enabled() {
            tracing::debug!("Cache disabled, skipping insert");
            return;
        }

        let ttl = ttl.unwrap_or(Duration::from_secs(*self.config.default_ttl_secs()));
        if ttl.is_zero() {
            tracing::debug!("Zero TTL, skipping insert");
            return;
        }

        let key = fingerprint(endpoint, params);
        let entry = CacheEntry {
            endpoint: endpoint.clone(),
            fingerprint: key.clone(),
            value,
            cached_at: now,
            expires_at: add_duration(now, ttl),
        };

        // Evict if at capacity
        if self.entries.len() >= *self.config.max_entries() && !self.entries.contains_key(&key) {
            self.evict_lru();
        }

        self.touch(&key);
        tracing::debug!(ttl = ?ttl, "Inserted entry into cache");
        self.entries.insert(key, entry);
        self.persist();
    }

    /// Get a cached call result.
    ///
    /// Returns None if:
    /// - Entry doesn't exist
    /// - Entry is expired (it is removed)
    /// - Cache is disabled
    #[tracing::instrument(
        skip(self, endpoint, params, now),
        fields(endpoint = %endpoint, cache_size = self.entries.len())
    )]
    pub fn get(
        &mut self,
        endpoint: &EndpointId,
        params: &RequestParams,
        now: DateTime<Utc>,
    ) -> Option<&CacheEntry> {
        if !self.config.enabled() {
            tracing::debug!("Cache disabled, returning None");
            return None;
        }

        let key = fingerprint(endpoint, params);

        let expired = match self.entries.get(&key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            tracing::debug!("Cache entry expired, removing");
            self.entries.remove(&key);
            self.access_order.retain(|k| k != &key);
            self.stats.misses += 1;
            return None;
        }

        self.touch(&key);
        self.stats.hits += 1;
        let entry = self.entries.get(&key)?;
        tracing::debug!(time_remaining = ?entry.time_remaining(now), "Cache hit");
        Some(entry)
    }

    /// Remove expired entries from cache.
    pub fn cleanup_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();

        self.entries.retain(|_, entry| !entry.is_expired(now));
        let entries = &self.entries;
        self.access_order.retain(|k| entries.contains_key(k));

        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::info!(
                removed,
                remaining = self.entries.len(),
                "Cleaned up expired cache entries"
            );
            self.persist();
        }
        removed
    }

    /// Clear all cache entries.
    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        self.access_order.clear();
        tracing::info!(cleared = count, "Cleared cache");
        self.persist();
    }

    /// Get number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit and miss counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Snapshot of the persisted form.
    pub fn document(&self) -> CacheDocument {
        CacheDocument {
            entries: self
                .access_order
                .iter()
                .filter_map(|k| self.entries.get(k).cloned())
                .collect(),
            stats: self.stats,
        }
    }

    /// Write the cache to its backing document, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn flush(&self) -> VigilResult<()> {
        match &self.store {
            Some(store) => store.save(&self.document()),
            None => Ok(()),
        }
    }

    fn persist(&self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "Failed to persist request cache");
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
        self.access_order.push(key.to_string());
    }

    /// Evict least recently used entry.
    fn evict_lru(&mut self) {
        if self.access_order.is_empty() {
            return;
        }
        let key = self.access_order.remove(0);
        if let Some(entry) = self.entries.remove(&key) {
            tracing::debug!(endpoint = %entry.endpoint, "Evicting LRU entry");
        }
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
