//! Call counters for rolling windows and calendar days.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use vigil_core::add_duration;

/// Timestamps of calls inside a trailing window.
///
/// A call recorded at `t` counts against the quota while `now - window < t`;
/// it is evicted once `t <= now - window`.
///
/// # Examples
///
/// ```
/// use vigil_rate_limit::RollingLedger;
/// use std::time::Duration;
///
/// let mut ledger = RollingLedger::new(3, Duration::from_secs(900));
/// let now = chrono::Utc::now();
/// ledger.record_call(now);
/// ledger.record_call(now);
/// assert_eq!(ledger.remaining_quota(now), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingLedger {
    limit: u32,
    window: Duration,
    calls: VecDeque<DateTime<Utc>>,
}

impl RollingLedger {
    /// Create an empty ledger.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            calls: VecDeque::new(),
        }
    }

    /// Rebuild a ledger from persisted call timestamps.
    pub fn with_calls(limit: u32, window: Duration, calls: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        let mut calls: Vec<DateTime<Utc>> = calls.into_iter().collect();
        calls.sort();
        Self {
            limit,
            window,
            calls: calls.into(),
        }
    }

    /// Calls allowed per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Append a call at `now`.
    pub fn record_call(&mut self, now: DateTime<Utc>) {
        self.calls.push_back(now);
    }

    /// Drop calls that have left the window.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        while let Some(oldest) = self.calls.front() {
            if add_duration(*oldest, self.window) <= now {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Calls inside the window ending at `now`.
    pub fn count(&mut self, now: DateTime<Utc>) -> u32 {
        self.evict(now);
        u32::try_from(self.calls.len()).unwrap_or(u32::MAX)
    }

    /// Calls made after `since` that are still inside the window.
    pub fn count_since(&mut self, since: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
        self.evict(now);
        let n = self.calls.iter().filter(|t| **t > since).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// `limit - count`, never negative.
    pub fn remaining_quota(&mut self, now: DateTime<Utc>) -> u32 {
        self.limit.saturating_sub(self.count(now))
    }

    /// When the oldest counted call leaves the window.
    pub fn window_reset(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.evict(now);
        self.calls.front().map(|oldest| add_duration(*oldest, self.window))
    }

    /// Counted calls, oldest first.
    pub fn calls(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.calls.iter()
    }
}

/// Counter of calls made during the current local calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLedger {
    /// Calls recorded since `last_reset`
    #[serde(default)]
    pub daily_used: u32,
    /// Local date the counter belongs to
    #[serde(default)]
    pub last_reset: Option<NaiveDate>,
}

impl DailyLedger {
    /// Reset the counter if `today` differs from the recorded day.
    ///
    /// Returns `true` when a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_reset == Some(today) {
            return false;
        }
        self.daily_used = 0;
        self.last_reset = Some(today);
        true
    }

    /// Count one call on `today`.
    pub fn record_call(&mut self, today: NaiveDate) {
        self.roll_over(today);
        self.daily_used = self.daily_used.saturating_add(1);
    }

    /// Calls left today under `quota`.
    pub fn remaining_quota(&mut self, quota: u32, today: NaiveDate) -> u32 {
        self.roll_over(today);
        quota.saturating_sub(self.daily_used)
    }
}
