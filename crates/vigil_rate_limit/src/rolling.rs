//! Rolling-window admission controller.

use crate::{
    Admission, AdmissionController, BackoffPolicy, BackoffState, DenialReason, EndpointLimit,
    RateLimitSnapshot, RollingConfig, RollingLedger,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use vigil_core::{Clock, EndpointClass, EndpointId, LocalZone, add_duration, remaining_secs};
use vigil_error::VigilResult;
use vigil_storage::JsonStore;

const ROLLING_DOCUMENT_VERSION: u32 = 1;

/// Quota state reported by the server, valid until `reset_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ServerWindow {
    limit: u32,
    used: u32,
    observed_at: DateTime<Utc>,
    reset_at: DateTime<Utc>,
}

/// Persisted state of one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingRecord {
    /// Calls inside the window, oldest first
    #[serde(default)]
    pub calls: Vec<DateTime<Utc>>,
    /// Failure counter and block
    #[serde(default)]
    pub backoff: BackoffState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server: Option<ServerWindow>,
}

/// Persisted state of the rolling-window controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingDocument {
    /// Per-endpoint state
    #[serde(default)]
    pub endpoints: BTreeMap<EndpointId, RollingRecord>,
    /// Time of the last write to any write endpoint
    #[serde(default)]
    pub last_post: Option<DateTime<Utc>>,
}

/// Whether the current local hour is a configured peak hour.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumIter,
    derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngagementWindow {
    /// Inside a peak hour
    #[display("PEAK_HOURS")]
    PeakHours,
    /// Outside every peak hour
    #[display("OFF_PEAK")]
    OffPeak,
}

/// Usage figures of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointUsage {
    /// Endpoint described
    pub endpoint: EndpointId,
    /// Read or write
    pub class: EndpointClass,
    /// Calls inside the current window
    pub calls_made: u32,
    /// Calls left in the current window
    pub calls_remaining: u32,
    /// Calls allowed per window
    pub limit: u32,
    /// When the oldest counted call leaves the window
    pub window_reset: DateTime<Utc>,
    /// Share of the quota in use
    pub efficiency: f64,
    /// Seconds left on an active backoff block
    pub backoff_remaining_secs: u64,
}

#[derive(Debug)]
struct RollingEndpoint {
    class: EndpointClass,
    policy: BackoffPolicy,
    ledger: RollingLedger,
    backoff: BackoffState,
    server: Option<ServerWindow>,
}

impl RollingEndpoint {
    fn new(limit: &EndpointLimit, record: RollingRecord) -> Self {
        Self {
            class: limit.class,
            policy: BackoffPolicy::for_window(limit.window(), limit.class.is_write()),
            ledger: RollingLedger::with_calls(limit.limit, limit.window(), record.calls),
            backoff: record.backoff,
            server: record.server,
        }
    }

    /// `(used, limit)` in the current window.
    ///
    /// While a server snapshot is fresh its limit applies and its used count
    /// is a floor for ours.
    fn usage(&mut self, now: DateTime<Utc>) -> (u32, u32) {
        if let Some(server) = self.server {
            if now < server.reset_at {
                let since = self.ledger.count_since(server.observed_at, now);
                let used = self
                    .ledger
                    .count(now)
                    .max(server.used.saturating_add(since));
                return (used, server.limit);
            }
            self.server = None;
        }
        (self.ledger.count(now), self.ledger.limit())
    }

    fn record(&self) -> RollingRecord {
        RollingRecord {
            calls: self.ledger.calls().copied().collect(),
            backoff: self.backoff.clone(),
            server: self.server,
        }
    }
}

/// Admission controller counting calls in a trailing window per endpoint.
///
/// Write endpoints additionally need a minimum spacing since the last write
/// of any write endpoint, and outside peak hours only a fraction of their
/// quota is usable. Endpoints missing from the configuration get the
/// configured default quota; a warning is logged when that happens.
///
/// Each endpoint's state sits behind its own mutex, so endpoints never
/// contend with each other. No lock is held across an `.await`.
#[derive(Debug)]
pub struct RollingWindowLimiter {
    config: RollingConfig,
    zone: LocalZone,
    clock: Arc<dyn Clock>,
    endpoints: RwLock<HashMap<EndpointId, Arc<Mutex<RollingEndpoint>>>>,
    last_post: Mutex<Option<DateTime<Utc>>>,
    store: Option<JsonStore<RollingDocument>>,
    persist_lock: Mutex<()>,
}

impl RollingWindowLimiter {
    /// Create an in-memory limiter.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: RollingConfig, clock: Arc<dyn Clock>) -> VigilResult<Self> {
        Self::build(config, clock, None, RollingDocument::default())
    }

    /// Create a limiter persisted to the document at `path`.
    ///
    /// Configured limits win over anything stored; only call history,
    /// backoff state and the last write time are restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid. An unreadable
    /// document is logged and replaced by fresh state.
    #[instrument(skip(config, clock, path))]
    pub fn open(
        config: RollingConfig,
        clock: Arc<dyn Clock>,
        path: impl Into<PathBuf>,
    ) -> VigilResult<Self> {
        let store = JsonStore::new(path, ROLLING_DOCUMENT_VERSION);
        let document = store.load_or_default();
        Self::build(config, clock, Some(store), document)
    }

    fn build(
        config: RollingConfig,
        clock: Arc<dyn Clock>,
        store: Option<JsonStore<RollingDocument>>,
        mut document: RollingDocument,
    ) -> VigilResult<Self> {
        config.validate()?;
        let zone = LocalZone::from_offset_minutes(*config.utc_offset_minutes())?;

        let mut endpoints = HashMap::new();
        for (id, limit) in config.endpoints() {
            let record = document.endpoints.remove(id).unwrap_or_default();
            endpoints.insert(
                id.clone(),
                Arc::new(Mutex::new(RollingEndpoint::new(limit, record))),
            );
        }
        for (id, record) in document.endpoints {
            warn!(endpoint = %id, "Restored endpoint has no configured limit, using default");
            endpoints.insert(
                id,
                Arc::new(Mutex::new(RollingEndpoint::new(config.default_limit(), record))),
            );
        }

        info!(
            endpoints = endpoints.len(),
            peak_hours = ?config.peak_hours(),
            off_peak_fraction = config.off_peak_fraction(),
            "Rolling-window limiter initialized"
        );

        Ok(Self {
            config,
            zone,
            clock,
            endpoints: RwLock::new(endpoints),
            last_post: Mutex::new(document.last_post),
            store,
            persist_lock: Mutex::new(()),
        })
    }

    /// Limiter configuration.
    pub fn config(&self) -> &RollingConfig {
        &self.config
    }

    /// Clock used for every decision.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn entry(&self, endpoint: &EndpointId) -> Arc<Mutex<RollingEndpoint>> {
        if let Some(entry) = self.endpoints.read().get(endpoint) {
            return Arc::clone(entry);
        }
        let mut endpoints = self.endpoints.write();
        let entry = endpoints.entry(endpoint.clone()).or_insert_with(|| {
            let limit = self.config.default_limit();
            warn!(
                endpoint = %endpoint,
                limit = limit.limit,
                window_secs = limit.window_secs,
                "Endpoint has no configured limit, using default"
            );
            Arc::new(Mutex::new(RollingEndpoint::new(limit, RollingRecord::default())))
        });
        Arc::clone(entry)
    }

    /// Read or write class of an endpoint.
    pub fn class_of(&self, endpoint: &EndpointId) -> EndpointClass {
        self.config
            .limit_for(endpoint)
            .map(|limit| limit.class)
            .unwrap_or(self.config.default_limit().class)
    }

    fn is_peak(&self, now: DateTime<Utc>) -> bool {
        self.config
            .peak_hours()
            .contains(&self.zone.local_hour(now))
    }

    fn post_interval(&self) -> Duration {
        Duration::from_secs(*self.config.min_post_interval_secs())
    }

    /// Earliest time the post spacing allows another write.
    fn post_ready_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self.last_post.lock() {
            Some(last) => add_duration(last, self.post_interval()).max(now),
            None => now,
        }
    }

    /// Adopt the server's view of an endpoint's quota.
    ///
    /// Until the reported reset time the server's limit applies and its used
    /// count is a floor for the local count. Without a reset time the
    /// snapshot is kept for one window.
    #[instrument(skip(self, endpoint, snapshot), fields(endpoint = %endpoint))]
    pub fn apply_snapshot(&self, endpoint: &EndpointId, snapshot: &RateLimitSnapshot) {
        let now = self.clock.now();
        {
            let entry = self.entry(endpoint);
            let mut state = entry.lock();
            let reset_at = snapshot
                .reset_at
                .unwrap_or_else(|| add_duration(now, state.ledger.window()));
            if reset_at <= now {
                debug!("Snapshot already expired, ignoring");
                return;
            }
            state.server = Some(ServerWindow {
                limit: snapshot.limit,
                used: snapshot.used(),
                observed_at: now,
                reset_at,
            });
            debug!(
                limit = snapshot.limit,
                used = snapshot.used(),
                reset_at = %reset_at,
                "Applied server rate limit snapshot"
            );
        }
        self.persist();
    }

    /// When a deferred request should next be tried.
    ///
    /// Writes go as soon as the post spacing allows during peak hours and
    /// otherwise wait for the next peak hour. Reads are spread out by
    /// priority: `now + (6 - priority) * 60s`.
    pub fn optimal_time(&self, endpoint: &EndpointId, priority: u8) -> DateTime<Utc> {
        let now = self.clock.now();
        if self.class_of(endpoint).is_write() {
            if self.is_peak(now) {
                self.post_ready_at(now)
            } else {
                self.zone
                    .next_hour_start(now, self.config.peak_hours())
                    .unwrap_or_else(|| self.post_ready_at(now))
            }
        } else {
            let steps = 6 - u64::from(priority.clamp(1, 5));
            add_duration(now, Duration::from_secs(steps * 60))
        }
    }

    /// Next time a write would land in a peak hour with the spacing satisfied.
    pub fn next_optimal_post_time(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let spacing_met = self.post_ready_at(now) <= now;
        if self.is_peak(now) && spacing_met {
            return now;
        }
        self.zone
            .next_hour_start(now, self.config.peak_hours())
            .unwrap_or_else(|| self.post_ready_at(now))
    }

    /// Whether the current local hour is a peak hour.
    pub fn engagement_window(&self) -> EngagementWindow {
        if self.is_peak(self.clock.now()) {
            EngagementWindow::PeakHours
        } else {
            EngagementWindow::OffPeak
        }
    }

    /// Usage of every known endpoint, sorted by endpoint.
    pub fn usage_analytics(&self) -> Vec<EndpointUsage> {
        let now = self.clock.now();
        let entries: Vec<(EndpointId, Arc<Mutex<RollingEndpoint>>)> = self
            .endpoints
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        let mut usage: Vec<EndpointUsage> = entries
            .into_iter()
            .map(|(endpoint, entry)| {
                let mut state = entry.lock();
                let (used, limit) = state.usage(now);
                EndpointUsage {
                    endpoint,
                    class: state.class,
                    calls_made: used,
                    calls_remaining: limit.saturating_sub(used),
                    limit,
                    window_reset: state.ledger.window_reset(now).unwrap_or(now),
                    efficiency: if limit == 0 {
                        0.0
                    } else {
                        f64::from(used) / f64::from(limit)
                    },
                    backoff_remaining_secs: state.backoff.blocked_for(now).unwrap_or(0),
                }
            })
            .collect();
        usage.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        usage
    }

    /// Endpoints currently blocked by backoff.
    pub fn endpoints_in_backoff(&self) -> Vec<EndpointId> {
        let now = self.clock.now();
        let mut blocked: Vec<EndpointId> = self
            .endpoints
            .read()
            .iter()
            .filter(|(_, entry)| entry.lock().backoff.blocked_for(now).is_some())
            .map(|(id, _)| id.clone())
            .collect();
        blocked.sort();
        blocked
    }

    /// Snapshot of the persisted form.
    pub fn document(&self) -> RollingDocument {
        let entries: Vec<(EndpointId, Arc<Mutex<RollingEndpoint>>)> = self
            .endpoints
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();
        RollingDocument {
            endpoints: entries
                .into_iter()
                .map(|(id, entry)| (id, entry.lock().record()))
                .collect(),
            last_post: *self.last_post.lock(),
        }
    }

    /// Must be called without holding any endpoint lock.
    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let _guard = self.persist_lock.lock();
        if let Err(e) = store.save(&self.document()) {
            tracing::error!(error = %e, "Failed to persist rolling-window state");
        }
    }
}

impl AdmissionController for RollingWindowLimiter {
    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    fn can_admit(&self, endpoint: &EndpointId) -> VigilResult<Admission> {
        let now = self.clock.now();
        let entry = self.entry(endpoint);
        let mut state = entry.lock();

        if let Some(remaining_secs) = state.backoff.blocked_for(now) {
            debug!(remaining_secs, "Endpoint in backoff");
            return Ok(Admission::Denied(DenialReason::Blocked { remaining_secs }));
        }

        let (used, limit) = state.usage(now);
        if used >= limit {
            debug!(used, limit, "Window quota exhausted");
            return Ok(Admission::Denied(DenialReason::WindowQuotaExhausted {
                used,
                limit,
                window_secs: state.ledger.window().as_secs(),
            }));
        }

        if state.class.is_write() {
            let ready = self.post_ready_at(now);
            if ready > now {
                return Ok(Admission::Denied(DenialReason::PostInterval {
                    remaining_secs: remaining_secs(ready, now),
                }));
            }

            if !self.is_peak(now) {
                let allowed = (f64::from(limit) * self.config.off_peak_fraction()).ceil() as u32;
                if used >= allowed {
                    debug!(used, allowed, "Off-peak throttle");
                    return Ok(Admission::Denied(DenialReason::OffPeakThrottle {
                        used,
                        allowed,
                    }));
                }
            }
        }

        debug!(used, limit, "Admitted");
        Ok(Admission::Admitted)
    }

    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    fn record_attempt(&self, endpoint: &EndpointId) -> VigilResult<()> {
        let now = self.clock.now();
        {
            let entry = self.entry(endpoint);
            let mut state = entry.lock();
            state.ledger.record_call(now);
            if state.class.is_write() {
                *self.last_post.lock() = Some(now);
            }
            debug!(calls_in_window = state.ledger.count(now), "Recorded call");
        }
        self.persist();
        Ok(())
    }

    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    fn record_success(&self, endpoint: &EndpointId) -> VigilResult<()> {
        let changed = {
            let entry = self.entry(endpoint);
            let mut state = entry.lock();
            let had_failures =
                state.backoff.consecutive_failures > 0 || state.backoff.blocked_until.is_some();
            state.backoff.record_success();
            had_failures
        };
        if changed {
            info!("Backoff cleared after success");
            self.persist();
        }
        Ok(())
    }

    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    fn record_failure(
        &self,
        endpoint: &EndpointId,
        retry_after: Option<Duration>,
    ) -> VigilResult<()> {
        let now = self.clock.now();
        {
            let entry = self.entry(endpoint);
            let mut state = entry.lock();
            let policy = state.policy;
            let delay = state.backoff.record_failure(&policy, retry_after, now);
            warn!(
                backoff_secs = delay.as_secs(),
                consecutive_failures = state.backoff.consecutive_failures,
                remote_hint = retry_after.is_some(),
                "Rate limit hit, backing off"
            );
        }
        self.persist();
        Ok(())
    }

    fn remaining_quota(&self, endpoint: &EndpointId) -> VigilResult<u32> {
        let now = self.clock.now();
        let entry = self.entry(endpoint);
        let mut state = entry.lock();
        let (used, limit) = state.usage(now);
        Ok(limit.saturating_sub(used))
    }
}
