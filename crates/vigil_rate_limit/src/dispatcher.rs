//! Cached, deferred execution of calls through the rolling-window limiter.

use crate::{
    AdmissionController, EngagementWindow, HeaderRateLimitDetector, PendingQueue,
    RateLimitSnapshot, RollingWindowLimiter,
};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use vigil_cache::{CacheStats, RequestCache, RequestParams};
use vigil_core::{EndpointId, add_duration};
use vigil_error::{AdmissionError, AdmissionErrorKind, FeedError, VigilResult};

/// Per-call options of [`RequestDispatcher::get_or_fetch`].
#[derive(Debug, Clone, PartialEq, Eq, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct FetchOptions {
    /// Cache lifetime of the result; `None` uses the cache default
    #[setters(strip_option)]
    ttl: Option<Duration>,
    /// 1 (most urgent) to 5
    priority: u8,
    /// Upper bound on the whole wait; `None` waits until retries run out
    #[setters(strip_option)]
    max_wait: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            priority: 3,
            max_wait: None,
        }
    }
}

/// Result of [`RequestDispatcher::get_or_fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// Call result
    pub value: JsonValue,
    /// True when served from the cache without spending quota
    pub from_cache: bool,
}

/// Outlook for the next write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingOutlook {
    /// Next time a write lands in a peak hour with spacing satisfied
    pub next_optimal_post_time: DateTime<Utc>,
    /// Whether the current hour is a peak hour
    pub engagement_window: EngagementWindow,
    /// Writes left in the post endpoint's window
    pub daily_posts_remaining: u32,
    /// Share of cache lookups that hit
    pub cache_hit_rate: f64,
    /// Deferred requests waiting for admission
    pub queue_size: usize,
    /// Endpoints blocked by backoff
    pub endpoints_in_backoff: Vec<EndpointId>,
}

/// Removes a queued request when the waiting future finishes or is dropped.
struct QueueSlot<'a> {
    queue: &'a Mutex<PendingQueue>,
    id: u64,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.queue.lock().remove(self.id);
    }
}

/// Front door for calls on the rolling-window path.
///
/// A lookup is answered from the cache when possible. Otherwise the call is
/// made if admitted, or queued and retried at its optimal time, polling until
/// it is due, first in line for its endpoint and admitted.
#[derive(Debug)]
pub struct RequestDispatcher {
    limiter: Arc<RollingWindowLimiter>,
    cache: Mutex<RequestCache>,
    queue: Mutex<PendingQueue>,
    detector: HeaderRateLimitDetector,
}

impl RequestDispatcher {
    /// Create a dispatcher over `limiter` and `cache`.
    pub fn new(limiter: Arc<RollingWindowLimiter>, cache: RequestCache) -> Self {
        Self {
            limiter,
            cache: Mutex::new(cache),
            queue: Mutex::new(PendingQueue::new()),
            detector: HeaderRateLimitDetector::new(),
        }
    }

    /// Underlying limiter.
    pub fn limiter(&self) -> &Arc<RollingWindowLimiter> {
        &self.limiter
    }

    /// Snapshots most recently reported by the server.
    pub fn detector(&self) -> &HeaderRateLimitDetector {
        &self.detector
    }

    /// Read the rate-limit headers of a response to `endpoint` and let the
    /// limiter adopt the server's count.
    ///
    /// Returns the snapshot, or `None` when the headers carry no quota.
    #[instrument(skip(self, headers), fields(endpoint = %endpoint))]
    pub async fn observe_headers(
        &self,
        endpoint: &EndpointId,
        headers: &HeaderMap,
    ) -> Option<RateLimitSnapshot> {
        let snapshot = self.detector.detect(endpoint, headers).await?;
        self.limiter.apply_snapshot(endpoint, &snapshot);
        Some(snapshot)
    }

    /// Deferred requests currently waiting.
    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }

    /// Cache hit and miss counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Drop expired cache entries, returning how many were removed.
    pub fn cleanup_cache(&self) -> usize {
        let now = self.limiter.clock().now();
        self.cache.lock().cleanup_expired(now)
    }

    /// Write the cache to its backing document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn flush_cache(&self) -> VigilResult<()> {
        self.cache.lock().flush()
    }

    /// Return a cached result or make the call once it is admitted.
    ///
    /// A failure that does not count against the endpoint (an unknown
    /// account, for example) completes the call and is returned as is.
    /// Other failures back the endpoint off and reschedule the request at
    /// `now + 2^retries * retry_base`.
    ///
    /// Dropping the future withdraws the request from the queue.
    ///
    /// # Errors
    ///
    /// - `AdmissionError::RetriesExhausted` after `max_retries` failures
    /// - `AdmissionError::WaitTimedOut` when `max_wait` passes first
    /// - the feed error of a call that failed for good
    #[instrument(skip(self, endpoint, params, options, fetch), fields(endpoint = %endpoint, priority = options.priority))]
    pub async fn get_or_fetch<F, Fut>(
        &self,
        endpoint: &EndpointId,
        params: &RequestParams,
        options: &FetchOptions,
        mut fetch: F,
    ) -> VigilResult<Fetched>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<JsonValue, FeedError>>,
    {
        let clock = Arc::clone(self.limiter.clock());
        let cached = self
            .cache
            .lock()
            .get(endpoint, params, clock.now())
            .map(|entry| entry.value().clone());
        if let Some(value) = cached {
            debug!("Served from cache");
            return Ok(Fetched {
                value,
                from_cache: true,
            });
        }

        let config = self.limiter.config();
        let poll = Duration::from_secs(*config.queue_poll_interval_secs());
        let max_retries = *config.max_retries();
        let retry_base = *config.retry_base_secs();

        let started = tokio::time::Instant::now();
        let deadline = options.max_wait.map(|wait| started + wait);
        let mut slot: Option<QueueSlot<'_>> = None;
        let mut retry_count = 0u32;

        loop {
            let now = clock.now();
            let my_turn = slot
                .as_ref()
                .is_none_or(|slot| self.queue.lock().is_next_due(slot.id, now));

            if my_turn {
                let admission = self.limiter.can_admit(endpoint)?;
                if admission.is_admitted() {
                    self.limiter.record_attempt(endpoint)?;
                    match fetch().await {
                        Ok(value) => {
                            self.limiter.record_success(endpoint)?;
                            self.cache.lock().insert(
                                endpoint,
                                params,
                                value.clone(),
                                options.ttl,
                                clock.now(),
                            );
                            debug!(retry_count, "Call completed");
                            return Ok(Fetched {
                                value,
                                from_cache: false,
                            });
                        }
                        Err(e) if !e.is_retryable() => {
                            self.limiter.record_success(endpoint)?;
                            debug!(error = %e, "Call failed without counting against endpoint");
                            return Err(e.into());
                        }
                        Err(e) => {
                            self.limiter.record_failure(endpoint, e.retry_after())?;
                            retry_count += 1;
                            if retry_count >= max_retries {
                                error!(attempts = retry_count, error = %e, "Request failed permanently");
                                return Err(AdmissionError::new(
                                    AdmissionErrorKind::RetriesExhausted {
                                        endpoint: endpoint.to_string(),
                                        attempts: retry_count,
                                        last_error: e.to_string(),
                                    },
                                )
                                .into());
                            }

                            let delay = Duration::from_secs(
                                retry_base.saturating_mul(1u64 << retry_count.min(32)),
                            );
                            let retry_at = add_duration(clock.now(), delay);
                            let id = match &slot {
                                Some(slot) => slot.id,
                                None => {
                                    let id = self.enqueue(endpoint, params, options.priority, retry_at);
                                    slot = Some(QueueSlot {
                                        queue: &self.queue,
                                        id,
                                    });
                                    id
                                }
                            };
                            self.queue.lock().reschedule(id, retry_at, retry_count);
                            warn!(
                                retry_count,
                                retry_at = %retry_at,
                                error = %e,
                                "Call failed, rescheduled"
                            );
                        }
                    }
                } else if slot.is_none() {
                    let at = self.limiter.optimal_time(endpoint, options.priority);
                    let id = self.enqueue(endpoint, params, options.priority, at);
                    slot = Some(QueueSlot {
                        queue: &self.queue,
                        id,
                    });
                    info!(reason = %admission, scheduled_at = %at, "Request deferred");
                } else {
                    debug!(reason = %admission, "Queued request still not admitted");
                }
            }

            let now = tokio::time::Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                warn!("Gave up waiting for admission");
                return Err(AdmissionError::new(AdmissionErrorKind::WaitTimedOut {
                    endpoint: endpoint.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                })
                .into());
            }
            let wake = deadline.map_or(now + poll, |deadline| (now + poll).min(deadline));
            tokio::time::sleep_until(wake).await;
        }
    }

    fn enqueue(
        &self,
        endpoint: &EndpointId,
        params: &RequestParams,
        priority: u8,
        at: DateTime<Utc>,
    ) -> u64 {
        self.queue
            .lock()
            .push(endpoint.clone(), params.clone(), priority, at)
    }

    /// Figures for planning the next write.
    ///
    /// # Errors
    ///
    /// Returns an error if the post endpoint's quota cannot be read.
    pub fn posting_outlook(&self) -> VigilResult<PostingOutlook> {
        let post_endpoint = self.limiter.config().post_endpoint();
        Ok(PostingOutlook {
            next_optimal_post_time: self.limiter.next_optimal_post_time(),
            engagement_window: self.limiter.engagement_window(),
            daily_posts_remaining: self.limiter.remaining_quota(post_endpoint)?,
            cache_hit_rate: self.cache_stats().hit_rate(),
            queue_size: self.queue_size(),
            endpoints_in_backoff: self.limiter.endpoints_in_backoff(),
        })
    }
}
