//! Configuration structures for the admission controllers.
//!
//! Both controllers are configured statically at construction. Values are
//! usually deserialized from the `[rolling]` and `[calendar]` sections of
//! `vigil.toml`; every field has a default so partial files are accepted.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use vigil_core::{EndpointClass, EndpointId};
use vigil_error::ConfigError;

/// Quota of one endpoint on the rolling-window controller.
///
/// ```toml
/// [rolling.endpoints.user_timeline]
/// limit = 1500
/// window_secs = 900
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimit {
    /// Calls allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Read or write endpoint
    #[serde(default)]
    pub class: EndpointClass,
}

impl EndpointLimit {
    /// Create a limit.
    pub fn new(limit: u32, window_secs: u64, class: EndpointClass) -> Self {
        Self {
            limit,
            window_secs,
            class,
        }
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Configuration of the rolling-window ("enhanced") controller.
///
/// # Examples
///
/// ```
/// use vigil_rate_limit::RollingConfig;
///
/// let config = RollingConfig::default().with_off_peak_fraction(0.5);
/// assert_eq!(config.peak_hours(), &vec![12, 18, 21]);
/// assert_eq!(*config.off_peak_fraction(), 0.5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
pub struct RollingConfig {
    /// Per-endpoint quotas
    #[serde(default = "default_rolling_endpoints")]
    endpoints: BTreeMap<EndpointId, EndpointLimit>,

    /// Local hours considered peak engagement time
    #[serde(default = "default_peak_hours")]
    peak_hours: Vec<u32>,

    /// Minimum spacing between any two writes (seconds)
    #[serde(default = "default_min_post_interval_secs")]
    min_post_interval_secs: u64,

    /// Share of a write quota usable outside peak hours
    #[serde(default = "default_off_peak_fraction")]
    off_peak_fraction: f64,

    /// How often a deferred request re-checks admission (seconds)
    #[serde(default = "default_queue_poll_interval_secs")]
    queue_poll_interval_secs: u64,

    /// Attempts before a deferred request fails permanently
    #[serde(default = "default_max_retries")]
    max_retries: u32,

    /// Base of the deferred retry delay (seconds)
    #[serde(default = "default_retry_base_secs")]
    retry_base_secs: u64,

    /// Quota applied to endpoints missing from `endpoints`
    #[serde(default = "default_fallback_limit")]
    default_limit: EndpointLimit,

    /// Endpoint whose remaining quota is reported as "posts remaining"
    #[serde(default = "default_post_endpoint")]
    post_endpoint: EndpointId,

    /// Offset of local time from UTC in minutes; host zone when absent
    #[serde(default)]
    utc_offset_minutes: Option<i32>,
}

fn default_rolling_endpoints() -> BTreeMap<EndpointId, EndpointLimit> {
    let read = |limit| EndpointLimit::new(limit, 900, EndpointClass::Read);
    let write = EndpointLimit::new(50, 86_400, EndpointClass::Write);
    [
        ("search_tweets", read(300)),
        ("user_timeline", read(1500)),
        ("user_lookup", read(300)),
        ("tweet_lookup", read(300)),
        ("create_tweet", write),
        ("create_reply", write),
        ("retweet", write),
    ]
    .into_iter()
    .map(|(name, limit)| (EndpointId::from(name), limit))
    .collect()
}

fn default_peak_hours() -> Vec<u32> {
    vec![12, 18, 21]
}

fn default_min_post_interval_secs() -> u64 {
    1800 // 30 minutes
}

fn default_off_peak_fraction() -> f64 {
    0.7
}

fn default_queue_poll_interval_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_secs() -> u64 {
    60
}

fn default_fallback_limit() -> EndpointLimit {
    EndpointLimit::new(300, 900, EndpointClass::Read)
}

fn default_post_endpoint() -> EndpointId {
    EndpointId::from("create_tweet")
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            endpoints: default_rolling_endpoints(),
            peak_hours: default_peak_hours(),
            min_post_interval_secs: default_min_post_interval_secs(),
            off_peak_fraction: default_off_peak_fraction(),
            queue_poll_interval_secs: default_queue_poll_interval_secs(),
            max_retries: default_max_retries(),
            retry_base_secs: default_retry_base_secs(),
            default_limit: default_fallback_limit(),
            post_endpoint: default_post_endpoint(),
            utc_offset_minutes: None,
        }
    }
}

impl RollingConfig {
    /// Quota of `endpoint`, if configured.
    pub fn limit_for(&self, endpoint: &EndpointId) -> Option<&EndpointLimit> {
        self.endpoints.get(endpoint)
    }

    /// Validates tuning values.
    ///
    /// # Errors
    ///
    /// Returns an error if a window or limit is zero, a peak hour is not a
    /// valid hour, the off-peak fraction is outside `[0, 1]`, or no attempt
    /// is allowed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((endpoint, _)) = self.endpoints.iter().find(|(_, l)| l.window_secs == 0) {
            return Err(ConfigError::new(format!(
                "Window of {} must be positive",
                endpoint
            )));
        }
        if self.default_limit.window_secs == 0 {
            return Err(ConfigError::new("Window of the default limit must be positive"));
        }
        if let Some(hour) = self.peak_hours.iter().find(|h| **h >= 24) {
            return Err(ConfigError::new(format!(
                "Peak hour must be below 24, got {}",
                hour
            )));
        }
        if !(0.0..=1.0).contains(&self.off_peak_fraction) {
            return Err(ConfigError::new(format!(
                "off_peak_fraction must be in [0.0, 1.0], got {}",
                self.off_peak_fraction
            )));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::new("max_retries must be at least 1"));
        }
        if self.queue_poll_interval_secs == 0 {
            return Err(ConfigError::new("queue_poll_interval_secs must be positive"));
        }
        Ok(())
    }
}

/// Daily allowance of one endpoint on the calendar-day controller.
///
/// ```toml
/// [calendar.endpoints.search_tweets]
/// daily_quota = 3
/// min_delay_secs = 21600
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuota {
    /// Calls allowed per local calendar day
    pub daily_quota: u32,
    /// Minimum time since the last success (seconds)
    pub min_delay_secs: u64,
    /// Read or write endpoint
    #[serde(default)]
    pub class: EndpointClass,
}

impl DailyQuota {
    /// Create a daily allowance.
    pub fn new(daily_quota: u32, min_delay_secs: u64, class: EndpointClass) -> Self {
        Self {
            daily_quota,
            min_delay_secs,
            class,
        }
    }

    /// Minimum time since the last success.
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(self.min_delay_secs)
    }
}

/// Configuration of the calendar-day ("free tier") controller.
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
pub struct CalendarConfig {
    /// Per-endpoint daily allowances
    #[serde(default = "default_calendar_endpoints")]
    endpoints: BTreeMap<EndpointId, DailyQuota>,

    /// First rate-limit backoff of read endpoints (seconds)
    #[serde(default = "default_read_backoff_base_secs")]
    read_backoff_base_secs: u64,

    /// First rate-limit backoff of write endpoints (seconds)
    #[serde(default = "default_write_backoff_base_secs")]
    write_backoff_base_secs: u64,

    /// Longest computed rate-limit backoff (seconds)
    #[serde(default = "default_backoff_ceiling_secs")]
    backoff_ceiling_secs: u64,

    /// Base of the failure cooldown measured from the last success (seconds)
    #[serde(default = "default_failure_cooldown_base_secs")]
    failure_cooldown_base_secs: u64,

    /// Cap of the failure cooldown (seconds)
    #[serde(default = "default_failure_cooldown_cap_secs")]
    failure_cooldown_cap_secs: u64,

    /// How often `wait_until_available` re-checks (seconds)
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,

    /// How long an attempt without a reported outcome blocks new calls (seconds)
    #[serde(default = "default_pending_timeout_secs")]
    pending_timeout_secs: u64,

    /// Endpoint consulted by the search strategy
    #[serde(default = "default_search_endpoint")]
    search_endpoint: EndpointId,

    /// Offset of local time from UTC in minutes; host zone when absent
    #[serde(default)]
    utc_offset_minutes: Option<i32>,
}

fn default_calendar_endpoints() -> BTreeMap<EndpointId, DailyQuota> {
    [
        ("search_tweets", DailyQuota::new(3, 6 * 3600, EndpointClass::Read)),
        ("user_timeline", DailyQuota::new(8, 2 * 3600, EndpointClass::Read)),
        ("user_lookup", DailyQuota::new(5, 30 * 60, EndpointClass::Read)),
        ("get_me", DailyQuota::new(2, 12 * 3600, EndpointClass::Read)),
    ]
    .into_iter()
    .map(|(name, quota)| (EndpointId::from(name), quota))
    .collect()
}

fn default_read_backoff_base_secs() -> u64 {
    3600
}

fn default_write_backoff_base_secs() -> u64 {
    7200
}

fn default_backoff_ceiling_secs() -> u64 {
    14_400 // 4 hours
}

fn default_failure_cooldown_base_secs() -> u64 {
    300
}

fn default_failure_cooldown_cap_secs() -> u64 {
    3600
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_pending_timeout_secs() -> u64 {
    900
}

fn default_search_endpoint() -> EndpointId {
    EndpointId::from("search_tweets")
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            endpoints: default_calendar_endpoints(),
            read_backoff_base_secs: default_read_backoff_base_secs(),
            write_backoff_base_secs: default_write_backoff_base_secs(),
            backoff_ceiling_secs: default_backoff_ceiling_secs(),
            failure_cooldown_base_secs: default_failure_cooldown_base_secs(),
            failure_cooldown_cap_secs: default_failure_cooldown_cap_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            pending_timeout_secs: default_pending_timeout_secs(),
            search_endpoint: default_search_endpoint(),
            utc_offset_minutes: None,
        }
    }
}

impl CalendarConfig {
    /// Validates tuning values.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll interval or pending timeout is zero or
    /// a backoff base exceeds the ceiling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::new("poll_interval_secs must be positive"));
        }
        if self.pending_timeout_secs == 0 {
            return Err(ConfigError::new("pending_timeout_secs must be positive"));
        }
        if self.read_backoff_base_secs > self.backoff_ceiling_secs
            || self.write_backoff_base_secs > self.backoff_ceiling_secs
        {
            return Err(ConfigError::new(format!(
                "Backoff bases ({}s read, {}s write) must not exceed the ceiling ({}s)",
                self.read_backoff_base_secs,
                self.write_backoff_base_secs,
                self.backoff_ceiling_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_defaults_cover_reads_and_writes() {
        let config = RollingConfig::default();
        let tweet = config.limit_for(&EndpointId::from("create_tweet")).unwrap();
        assert_eq!(tweet.limit, 50);
        assert!(tweet.class.is_write());
        let timeline = config.limit_for(&EndpointId::from("user_timeline")).unwrap();
        assert_eq!((timeline.limit, timeline.window_secs), (1500, 900));
    }

    #[test]
    fn rolling_rejects_bad_fraction() {
        let config = RollingConfig::default().with_off_peak_fraction(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_calendar_section_keeps_defaults() {
        let config: CalendarConfig = serde_json::from_str(r#"{"poll_interval_secs": 5}"#).unwrap();
        assert_eq!(*config.poll_interval_secs(), 5);
        assert_eq!(config.endpoints().len(), 4);
        assert_eq!(*config.backoff_ceiling_secs(), 14_400);
    }

    #[test]
    fn calendar_rejects_zero_pending_timeout() {
        let config = CalendarConfig::default().with_pending_timeout_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn calendar_rejects_base_above_ceiling() {
        let config = CalendarConfig::default().with_backoff_ceiling_secs(60);
        assert!(config.validate().is_err());
    }
}
