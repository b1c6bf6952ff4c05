//! Request result caching with TTL support.
//!
//! This crate caches the results of remote calls keyed by endpoint and
//! request parameters, so repeated lookups inside the TTL never spend quota.
//! The cache can be backed by a JSON document that survives restarts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod key;

pub use cache::{CacheDocument, CacheEntry, CacheStats, RequestCache};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use key::{RequestParams, canonical_json, fingerprint};
