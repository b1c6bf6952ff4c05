//! Calendar-day ("free tier") admission controller.
//!
//! Built for accounts whose allowance is a handful of calls per day. Every
//! endpoint has a daily quota, a minimum delay since its last success and a
//! failure cooldown, and at most one call in flight.

use crate::{
    Admission, AdmissionController, BackoffPolicy, BackoffState, CalendarConfig, DailyLedger,
    DailyQuota, DenialReason,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use vigil_core::{Clock, EndpointId, LocalZone, add_duration, remaining_secs};
use vigil_error::{ConfigError, VigilResult};
use vigil_storage::JsonStore;

const CALENDAR_DOCUMENT_VERSION: u32 = 1;

/// Persisted state of one calendar endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRecord {
    /// Calls counted today
    #[serde(flatten)]
    pub daily: DailyLedger,
    /// Time of the last completed call
    #[serde(default, deserialize_with = "crate::timestamp::optional_instant")]
    pub last_success: Option<DateTime<Utc>>,
    /// Failure counter and block
    #[serde(flatten)]
    pub backoff: BackoffState,
}

/// Persisted form of the calendar-day controller, keyed by endpoint.
pub type CalendarDocument = BTreeMap<EndpointId, CalendarRecord>;

/// Lifecycle phase of a calendar endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum EndpointPhase {
    /// Ready for a call once the delays are met
    #[display("available")]
    Available,
    /// An attempt was recorded and has not reported back
    #[display("pending_result")]
    PendingResult,
    /// Blocked after a rate-limit failure
    #[display("backoff")]
    Backoff,
    /// No calls left until the next local day
    #[display("quota_exhausted")]
    QuotaExhausted,
}

/// Status line of one calendar endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStatus {
    /// Calls made today
    pub used: u32,
    /// Calls allowed per day
    pub quota: u32,
    /// Whether a call would be admitted now
    pub can_request: bool,
    /// Admission reason, `OK` when admissible
    pub reason: String,
    /// Seconds until the endpoint is expected to be admissible
    pub next_available_in_secs: u64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Time of the last completed call
    pub last_success: Option<DateTime<Utc>>,
    /// Lifecycle phase
    pub phase: EndpointPhase,
}

/// Summary of every calendar endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeTierStatus {
    /// Per-endpoint status
    pub endpoints: BTreeMap<EndpointId, EndpointStatus>,
    /// Calls made today across endpoints
    pub total_used_today: u32,
    /// Calls allowed per day across endpoints
    pub total_daily_quota: u32,
    /// Next local midnight
    pub next_reset: DateTime<Utc>,
}

/// Recommendation for the keyword search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Do not search now
    Wait {
        /// Why searching is not possible
        reason: String,
        /// Seconds until the next search opportunity
        next_in_secs: u64,
        /// Time of the next search opportunity
        next_at: DateTime<Utc>,
    },
    /// Searching is possible now
    Search {
        /// Searches left today
        remaining_quota_today: u32,
        /// Keywords to combine per search
        keywords_per_search: u32,
        /// Spacing to keep between searches (seconds)
        delay_between_searches_secs: u64,
    },
}

#[derive(Debug)]
struct CalendarEndpoint {
    quota: DailyQuota,
    record: CalendarRecord,
    /// When the attempt still awaiting its outcome was recorded
    pending_since: Option<DateTime<Utc>>,
}

impl CalendarEndpoint {
    /// Whether an attempt recorded less than `timeout` ago is unanswered.
    fn is_pending(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.pending_since
            .is_some_and(|since| now < add_duration(since, timeout))
    }

    /// Reset the day counter, failures and any unanswered attempt when the
    /// local date changed.
    fn roll_over(&mut self, endpoint: &EndpointId, today: NaiveDate) -> bool {
        let previous = self.record.daily.last_reset;
        if !self.record.daily.roll_over(today) {
            return false;
        }
        self.record.backoff.consecutive_failures = 0;
        self.pending_since = None;
        if previous.is_some() {
            info!(endpoint = %endpoint, %today, "New day, daily quota reset");
        }
        true
    }
}

/// Conservative admission controller with calendar-day quotas.
///
/// Only configured endpoints exist; asking about any other endpoint is a
/// configuration error.
#[derive(Debug)]
pub struct CalendarDayLimiter {
    config: CalendarConfig,
    zone: LocalZone,
    clock: Arc<dyn Clock>,
    endpoints: HashMap<EndpointId, Mutex<CalendarEndpoint>>,
    store: Option<JsonStore<CalendarDocument>>,
    persist_lock: Mutex<()>,
}

impl CalendarDayLimiter {
    /// Create an in-memory limiter.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: CalendarConfig, clock: Arc<dyn Clock>) -> VigilResult<Self> {
        Self::build(config, clock, None, CalendarDocument::new())
    }

    /// Create a limiter persisted to the document at `path`.
    ///
    /// Quotas always come from the configuration. Stored state of endpoints
    /// that are no longer configured is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid. An unreadable
    /// document is logged and replaced by fresh state.
    #[instrument(skip(config, clock, path))]
    pub fn open(
        config: CalendarConfig,
        clock: Arc<dyn Clock>,
        path: impl Into<PathBuf>,
    ) -> VigilResult<Self> {
        let store = JsonStore::new(path, CALENDAR_DOCUMENT_VERSION);
        let document = store.load_or_default();
        Self::build(config, clock, Some(store), document)
    }

    fn build(
        config: CalendarConfig,
        clock: Arc<dyn Clock>,
        store: Option<JsonStore<CalendarDocument>>,
        mut document: CalendarDocument,
    ) -> VigilResult<Self> {
        config.validate()?;
        let zone = LocalZone::from_offset_minutes(*config.utc_offset_minutes())?;

        let endpoints: HashMap<EndpointId, Mutex<CalendarEndpoint>> = config
            .endpoints()
            .iter()
            .map(|(id, quota)| {
                let record = document.remove(id).unwrap_or_default();
                (
                    id.clone(),
                    Mutex::new(CalendarEndpoint {
                        quota: *quota,
                        record,
                        pending_since: None,
                    }),
                )
            })
            .collect();
        for id in document.keys() {
            debug!(endpoint = %id, "Dropping stored state of unconfigured endpoint");
        }

        info!(endpoints = endpoints.len(), "Calendar-day limiter initialized");
        Ok(Self {
            config,
            zone,
            clock,
            endpoints,
            store,
            persist_lock: Mutex::new(()),
        })
    }

    /// Limiter configuration.
    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    fn endpoint(&self, endpoint: &EndpointId) -> VigilResult<&Mutex<CalendarEndpoint>> {
        self.endpoints.get(endpoint).ok_or_else(|| {
            ConfigError::new(format!(
                "Unknown endpoint '{}' has no daily quota configured",
                endpoint
            ))
            .into()
        })
    }

    /// Run `f` on the endpoint after rolling its day over.
    ///
    /// The document is persisted afterwards when `f` reports a change or the
    /// day rolled over.
    fn update<R>(
        &self,
        endpoint: &EndpointId,
        f: impl FnOnce(&mut CalendarEndpoint, DateTime<Utc>) -> (R, bool),
    ) -> VigilResult<R> {
        let now = self.clock.now();
        let today = self.zone.local_date(now);
        let (result, dirty) = {
            let mut state = self.endpoint(endpoint)?.lock();
            let rolled = state.roll_over(endpoint, today);
            let (result, changed) = f(&mut state, now);
            (result, rolled || changed)
        };
        if dirty {
            self.persist();
        }
        Ok(result)
    }

    /// `min(cap, base * 2^failures)`.
    fn pending_timeout(&self) -> Duration {
        Duration::from_secs(*self.config.pending_timeout_secs())
    }

    fn failure_cooldown(&self, failures: u32) -> Duration {
        let factor = 2u64.checked_pow(failures).unwrap_or(u64::MAX);
        let secs = self
            .config
            .failure_cooldown_base_secs()
            .saturating_mul(factor)
            .min(*self.config.failure_cooldown_cap_secs());
        Duration::from_secs(secs)
    }

    fn check(&self, state: &CalendarEndpoint, now: DateTime<Utc>) -> Admission {
        let record = &state.record;
        if let Some(remaining_secs) = record.backoff.blocked_for(now) {
            return Admission::Denied(DenialReason::Blocked { remaining_secs });
        }
        if record.daily.daily_used >= state.quota.daily_quota {
            return Admission::Denied(DenialReason::DailyQuotaExhausted {
                used: record.daily.daily_used,
                quota: state.quota.daily_quota,
            });
        }
        if state.is_pending(now, self.pending_timeout()) {
            return Admission::Denied(DenialReason::PendingResult);
        }
        if let Some(last_success) = record.last_success {
            let ready = add_duration(last_success, state.quota.min_delay());
            if now < ready {
                return Admission::Denied(DenialReason::MinimumDelay {
                    remaining_secs: remaining_secs(ready, now),
                });
            }
            let failures = record.backoff.consecutive_failures;
            if failures > 0 {
                let ready = add_duration(last_success, self.failure_cooldown(failures));
                if now < ready {
                    return Admission::Denied(DenialReason::ExponentialBackoff {
                        remaining_secs: remaining_secs(ready, now),
                    });
                }
            }
        }
        Admission::Admitted
    }

    fn phase_of(&self, state: &CalendarEndpoint, now: DateTime<Utc>) -> EndpointPhase {
        if state.record.daily.daily_used >= state.quota.daily_quota {
            EndpointPhase::QuotaExhausted
        } else if state.record.backoff.blocked_for(now).is_some() {
            EndpointPhase::Backoff
        } else if state.is_pending(now, self.pending_timeout()) {
            EndpointPhase::PendingResult
        } else {
            EndpointPhase::Available
        }
    }

    fn next_available_of(&self, state: &CalendarEndpoint, now: DateTime<Utc>) -> DateTime<Utc> {
        let record = &state.record;
        let mut candidates = vec![now];
        if let Some(until) = record.backoff.blocked_until.filter(|until| now < *until) {
            candidates.push(until);
        }
        if record.daily.daily_used >= state.quota.daily_quota {
            candidates.push(self.zone.next_local_midnight(now));
        }
        if let Some(last_success) = record.last_success {
            candidates.push(add_duration(last_success, state.quota.min_delay()));
            if record.backoff.consecutive_failures > 0 {
                candidates.push(add_duration(
                    last_success,
                    self.failure_cooldown(record.backoff.consecutive_failures),
                ));
            }
        }
        candidates.into_iter().max().unwrap_or(now)
    }

    /// Lifecycle phase of `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unconfigured endpoint.
    pub fn phase(&self, endpoint: &EndpointId) -> VigilResult<EndpointPhase> {
        self.update(endpoint, |state, now| (self.phase_of(state, now), false))
    }

    /// Earliest time `endpoint` is expected to be admissible.
    ///
    /// The latest of: the end of an active block, the next local midnight
    /// when today's quota is spent, and the end of the minimum delay and
    /// failure cooldown since the last success. `now` when nothing applies.
    ///
    /// # Errors
    ///
    /// Returns an error for an unconfigured endpoint.
    pub fn next_available_time(&self, endpoint: &EndpointId) -> VigilResult<DateTime<Utc>> {
        self.update(endpoint, |state, now| {
            (self.next_available_of(state, now), false)
        })
    }

    /// Status of every configured endpoint.
    #[instrument(skip(self))]
    pub fn status_summary(&self) -> FreeTierStatus {
        let now = self.clock.now();
        let today = self.zone.local_date(now);
        let mut rolled = false;
        let mut endpoints = BTreeMap::new();

        for (id, entry) in &self.endpoints {
            let mut state = entry.lock();
            rolled |= state.roll_over(id, today);
            let admission = self.check(&state, now);
            let next_at = self.next_available_of(&state, now);
            endpoints.insert(
                id.clone(),
                EndpointStatus {
                    used: state.record.daily.daily_used,
                    quota: state.quota.daily_quota,
                    can_request: admission.is_admitted(),
                    reason: admission.to_string(),
                    next_available_in_secs: remaining_secs(next_at, now),
                    consecutive_failures: state.record.backoff.consecutive_failures,
                    last_success: state.record.last_success,
                    phase: self.phase_of(&state, now),
                },
            );
        }
        if rolled {
            self.persist();
        }

        FreeTierStatus {
            total_used_today: endpoints.values().map(|s| s.used).sum(),
            total_daily_quota: endpoints.values().map(|s| s.quota).sum(),
            endpoints,
            next_reset: self.zone.next_local_midnight(now),
        }
    }

    /// Whether to search now and how, based on the search endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the search endpoint is not configured.
    pub fn search_strategy(&self) -> VigilResult<SearchStrategy> {
        let endpoint = self.config.search_endpoint().clone();
        self.update(&endpoint, |state, now| {
            let strategy = match self.check(state, now) {
                Admission::Denied(reason) => {
                    let next_at = self.next_available_of(state, now);
                    SearchStrategy::Wait {
                        reason: reason.to_string(),
                        next_in_secs: remaining_secs(next_at, now),
                        next_at,
                    }
                }
                Admission::Admitted => SearchStrategy::Search {
                    remaining_quota_today: state
                        .quota
                        .daily_quota
                        .saturating_sub(state.record.daily.daily_used),
                    keywords_per_search: 1,
                    delay_between_searches_secs: state.quota.min_delay_secs,
                },
            };
            (strategy, false)
        })
    }

    /// Forget all usage, failures and blocks of `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unconfigured endpoint.
    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    pub fn force_reset(&self, endpoint: &EndpointId) -> VigilResult<()> {
        self.update(endpoint, |state, now| {
            state.record = CalendarRecord {
                daily: DailyLedger {
                    daily_used: 0,
                    last_reset: Some(self.zone.local_date(now)),
                },
                ..CalendarRecord::default()
            };
            state.pending_since = None;
            info!("Endpoint state force-reset");
            ((), true)
        })
    }

    /// Wait until `endpoint` is admissible, polling at the configured interval.
    ///
    /// Returns `false` once `max_wait` has passed without admission. The
    /// future only reads state, so dropping it at any poll leaves the ledger
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error for an unconfigured endpoint.
    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    pub async fn wait_until_available(
        &self,
        endpoint: &EndpointId,
        max_wait: Duration,
    ) -> VigilResult<bool> {
        let poll = Duration::from_secs(*self.config.poll_interval_secs());
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            let admission = self.can_admit(endpoint)?;
            if admission.is_admitted() {
                return Ok(true);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!(
                    waited_secs = max_wait.as_secs(),
                    reason = %admission,
                    "Gave up waiting for endpoint"
                );
                return Ok(false);
            }

            debug!(reason = %admission, "Endpoint not available, waiting");
            tokio::time::sleep_until((now + poll).min(deadline)).await;
        }
    }

    /// Snapshot of the persisted form.
    pub fn document(&self) -> CalendarDocument {
        self.endpoints
            .iter()
            .map(|(id, entry)| (id.clone(), entry.lock().record.clone()))
            .collect()
    }

    /// Must be called without holding any endpoint lock.
    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let _guard = self.persist_lock.lock();
        if let Err(e) = store.save(&self.document()) {
            tracing::error!(error = %e, "Failed to persist calendar-day state");
        }
    }
}

impl AdmissionController for CalendarDayLimiter {
    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    fn can_admit(&self, endpoint: &EndpointId) -> VigilResult<Admission> {
        let admission = self.update(endpoint, |state, now| (self.check(state, now), false))?;
        debug!(result = %admission, "Checked admission");
        Ok(admission)
    }

    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    fn record_attempt(&self, endpoint: &EndpointId) -> VigilResult<()> {
        self.update(endpoint, |state, now| {
            state.record.daily.record_call(self.zone.local_date(now));
            state.pending_since = Some(now);
            info!(
                used = state.record.daily.daily_used,
                quota = state.quota.daily_quota,
                "Recorded attempt"
            );
            ((), true)
        })
    }

    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    fn record_success(&self, endpoint: &EndpointId) -> VigilResult<()> {
        self.update(endpoint, |state, now| {
            state.record.last_success = Some(now);
            state.record.backoff.record_success();
            state.pending_since = None;
            debug!("Recorded success");
            ((), true)
        })
    }

    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    fn record_failure(
        &self,
        endpoint: &EndpointId,
        retry_after: Option<Duration>,
    ) -> VigilResult<()> {
        self.update(endpoint, |state, now| {
            let base = if state.quota.class.is_write() {
                *self.config.write_backoff_base_secs()
            } else {
                *self.config.read_backoff_base_secs()
            };
            let policy = BackoffPolicy::new(
                Duration::from_secs(base),
                Duration::from_secs(*self.config.backoff_ceiling_secs()),
            );
            let delay = state.record.backoff.record_failure(&policy, retry_after, now);
            state.pending_since = None;
            warn!(
                backoff_secs = delay.as_secs(),
                consecutive_failures = state.record.backoff.consecutive_failures,
                "Rate limit hit, backing off"
            );
            ((), true)
        })
    }

    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    fn abandon_attempt(&self, endpoint: &EndpointId) -> VigilResult<()> {
        self.update(endpoint, |state, _| {
            if state.pending_since.take().is_some() {
                warn!("Attempt abandoned before its outcome was reported");
            }
            ((), false)
        })
    }

    fn remaining_quota(&self, endpoint: &EndpointId) -> VigilResult<u32> {
        self.update(endpoint, |state, _| {
            (
                state
                    .quota
                    .daily_quota
                    .saturating_sub(state.record.daily.daily_used),
                false,
            )
        })
    }
}
