//! Detection of rate-limit state from API response headers.
//!
//! The platform reports its view of a quota on every response:
//! - `x-rate-limit-limit`: calls allowed in the current window
//! - `x-rate-limit-remaining`: calls left
//! - `x-rate-limit-reset`: unix timestamp when the window resets
//! - `retry-after`: seconds to wait, on refusals
//!
//! Header detection is more accurate than configuration since it reflects
//! the limits actually enforced for the account.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use vigil_core::EndpointId;

/// Server-reported quota state of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    /// Calls allowed in the current window
    pub limit: u32,
    /// Calls left in the current window
    pub remaining: u32,
    /// When the window resets
    pub reset_at: Option<DateTime<Utc>>,
    /// Server requested wait before the next call
    pub retry_after: Option<Duration>,
}

impl RateLimitSnapshot {
    /// Calls already used according to the server.
    pub fn used(&self) -> u32 {
        self.limit.saturating_sub(self.remaining)
    }

    /// True when the server reports no calls left.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Parses and caches rate-limit snapshots per endpoint.
///
/// # Example
///
/// ```rust
/// use vigil_rate_limit::HeaderRateLimitDetector;
/// use vigil_core::EndpointId;
/// use reqwest::header::{HeaderMap, HeaderValue};
///
/// # #[tokio::main]
/// # async fn main() {
/// let detector = HeaderRateLimitDetector::new();
/// let mut headers = HeaderMap::new();
/// headers.insert("x-rate-limit-limit", HeaderValue::from_static("300"));
/// headers.insert("x-rate-limit-remaining", HeaderValue::from_static("12"));
/// headers.insert("x-rate-limit-reset", HeaderValue::from_static("1715595300"));
///
/// let endpoint = EndpointId::from("search_tweets");
/// let snapshot = detector.detect(&endpoint, &headers).await.unwrap();
/// assert_eq!(snapshot.used(), 288);
/// assert!(detector.get_cached(&endpoint).await.is_some());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HeaderRateLimitDetector {
    /// Most recent snapshot per endpoint
    detected: Arc<RwLock<HashMap<EndpointId, RateLimitSnapshot>>>,
}

impl HeaderRateLimitDetector {
    /// Create a new header rate limit detector.
    #[instrument]
    pub fn new() -> Self {
        debug!("Creating new header rate limit detector");
        Self {
            detected: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Parse rate-limit headers of a response to `endpoint`.
    ///
    /// Returns `None` when the limit or remaining header is missing or
    /// malformed. A successful parse replaces the cached snapshot.
    #[instrument(skip(self, headers), fields(endpoint = %endpoint))]
    pub async fn detect(
        &self,
        endpoint: &EndpointId,
        headers: &HeaderMap,
    ) -> Option<RateLimitSnapshot> {
        let snapshot = parse_snapshot(headers)?;
        debug!(
            limit = snapshot.limit,
            remaining = snapshot.remaining,
            reset_at = ?snapshot.reset_at,
            "Detected rate limit from headers"
        );
        self.detected
            .write()
            .await
            .insert(endpoint.clone(), snapshot.clone());
        Some(snapshot)
    }

    /// Last snapshot detected for `endpoint`.
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    pub async fn get_cached(&self, endpoint: &EndpointId) -> Option<RateLimitSnapshot> {
        let cached = self.detected.read().await.get(endpoint).cloned();
        debug!(has_cached = cached.is_some(), "Retrieving cached rate limits");
        cached
    }

    /// Forget every cached snapshot.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) {
        debug!("Clearing cached rate limits");
        self.detected.write().await.clear();
    }
}

impl Default for HeaderRateLimitDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a snapshot from headers without caching it.
pub fn parse_snapshot(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
    let limit = parse_header_u32(headers, "x-rate-limit-limit")?;
    let remaining = parse_header_u32(headers, "x-rate-limit-remaining")?;
    let reset_at = parse_header_i64(headers, "x-rate-limit-reset")
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    let retry_after = parse_header_u64(headers, "retry-after").map(Duration::from_secs);
    Some(RateLimitSnapshot {
        limit,
        remaining,
        reset_at,
        retry_after,
    })
}

/// Helper to parse u32 from header value.
fn parse_header_u32(headers: &HeaderMap, key: &str) -> Option<u32> {
    headers.get(key)?.to_str().ok()?.trim().parse().ok()
}

/// Helper to parse u64 from header value.
fn parse_header_u64(headers: &HeaderMap, key: &str) -> Option<u64> {
    headers.get(key)?.to_str().ok()?.trim().parse().ok()
}

/// Helper to parse i64 from header value.
fn parse_header_i64(headers: &HeaderMap, key: &str) -> Option<i64> {
    headers.get(key)?.to_str().ok()?.trim().parse().ok()
}
