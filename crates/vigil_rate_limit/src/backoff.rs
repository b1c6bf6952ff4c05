//! Cooldown after failures and remote rate-limit hits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_core::{add_duration, remaining_secs};

/// Exponential backoff with a ceiling.
///
/// # Examples
///
/// ```
/// use vigil_rate_limit::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::new(Duration::from_secs(3600), Duration::from_secs(14_400));
/// assert_eq!(policy.compute(1), Duration::from_secs(3600));
/// assert_eq!(policy.compute(2), Duration::from_secs(7200));
/// assert_eq!(policy.compute(5), Duration::from_secs(14_400));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    ceiling: Duration,
}

impl BackoffPolicy {
    /// Create a policy.
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self { base, ceiling }
    }

    /// Policy of the rolling-window controller: the window itself for reads,
    /// twice the window for writes, ceiling four times the base.
    pub fn for_window(window: Duration, is_write: bool) -> Self {
        let base = if is_write {
            window.saturating_mul(2)
        } else {
            window
        };
        Self::new(base, base.saturating_mul(4))
    }

    /// `base * 2^(failures - 1)` clamped to the ceiling; zero without failures.
    pub fn compute(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(failures - 1).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.ceiling)
    }
}

/// Failure counter and block of one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffState {
    /// Failures since the last success
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Endpoint is inadmissible until this instant
    #[serde(default, deserialize_with = "crate::timestamp::optional_instant")]
    pub blocked_until: Option<DateTime<Utc>>,
}

impl BackoffState {
    /// Seconds left on an active block, `None` when not blocked.
    pub fn blocked_for(&self, now: DateTime<Utc>) -> Option<u64> {
        self.blocked_until
            .filter(|until| now < *until)
            .map(|until| remaining_secs(until, now))
    }

    /// Register a failure and extend the block.
    ///
    /// A remote `retry_after` replaces the computed delay. The block never
    /// moves earlier than an existing one. Returns the delay applied.
    pub fn record_failure(
        &mut self,
        policy: &BackoffPolicy,
        retry_after: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let delay = retry_after.unwrap_or_else(|| policy.compute(self.consecutive_failures));
        let candidate = add_duration(now, delay);
        self.blocked_until = Some(match self.blocked_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        });
        delay
    }

    /// Clear failures and any block.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.blocked_until = None;
    }
}
