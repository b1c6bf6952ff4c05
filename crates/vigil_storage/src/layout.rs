//! File layout under the data directory.

use std::path::{Path, PathBuf};

/// Locations of the persisted stores.
///
/// ```text
/// {data_dir}/
/// ├── rate_limits/
/// │   ├── free_tier_limits.json
/// │   └── rolling_state.json
/// ├── cache/
/// │   └── request_cache.json
/// └── strategic_accounts/
///     └── processed_tweets.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Calendar-day limiter state.
    pub fn free_tier_limits(&self) -> PathBuf {
        self.root.join("rate_limits").join("free_tier_limits.json")
    }

    /// Rolling-window limiter state.
    pub fn rolling_state(&self) -> PathBuf {
        self.root.join("rate_limits").join("rolling_state.json")
    }

    /// Request cache.
    pub fn request_cache(&self) -> PathBuf {
        self.root.join("cache").join("request_cache.json")
    }

    /// Processed-content set.
    pub fn processed_content(&self) -> PathBuf {
        self.root
            .join("strategic_accounts")
            .join("processed_tweets.json")
    }
}
