//! The admission contract shared by both controllers.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_core::EndpointId;
use vigil_error::VigilResult;

/// Why a call may not be made right now.
///
/// The rendered text is the primary operator-facing signal, so every
/// variant names the quota or the time left.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialReason {
    /// Remote rate limit or local backoff block is active
    #[display("Blocked for {}s due to rate limit", remaining_secs)]
    Blocked {
        /// Seconds until the block ends
        remaining_secs: u64,
    },
    /// Calendar-day allowance is used up
    #[display("Daily quota exhausted: {}/{}", used, quota)]
    DailyQuotaExhausted {
        /// Calls made today
        used: u32,
        /// Calls allowed per day
        quota: u32,
    },
    /// Not enough time since the last success
    #[display("Minimum delay not met: {}s remaining", remaining_secs)]
    MinimumDelay {
        /// Seconds until the delay is satisfied
        remaining_secs: u64,
    },
    /// Rolling-window quota is used up
    #[display("Window quota exhausted: {}/{} in {}s", used, limit, window_secs)]
    WindowQuotaExhausted {
        /// Calls in the current window
        used: u32,
        /// Calls allowed per window
        limit: u32,
        /// Window length in seconds
        window_secs: u64,
    },
    /// Not enough time since the last write
    #[display("Post interval not met: {}s remaining", remaining_secs)]
    PostInterval {
        /// Seconds until another write is allowed
        remaining_secs: u64,
    },
    /// Reduced write allowance outside peak hours is used up
    #[display("Off-peak throttle: {}/{} outside peak hours", used, allowed)]
    OffPeakThrottle {
        /// Calls in the current window
        used: u32,
        /// Calls allowed outside peak hours
        allowed: u32,
    },
    /// Cooldown after consecutive failures, measured from the last success
    #[display("Exponential backoff: {}s remaining", remaining_secs)]
    ExponentialBackoff {
        /// Seconds until the cooldown ends
        remaining_secs: u64,
    },
    /// An attempt was recorded and its outcome is not known yet
    #[display("Request already pending result")]
    PendingResult,
}

impl DenialReason {
    /// Time until this particular obstacle clears, when it is known.
    pub fn retry_in(&self) -> Option<Duration> {
        match self {
            Self::Blocked { remaining_secs }
            | Self::MinimumDelay { remaining_secs }
            | Self::PostInterval { remaining_secs }
            | Self::ExponentialBackoff { remaining_secs } => {
                Some(Duration::from_secs(*remaining_secs))
            }
            _ => None,
        }
    }
}

/// Outcome of an admission check.
///
/// A denial is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Admission {
    /// The call may be made now
    Admitted,
    /// The call must wait
    Denied(DenialReason),
}

impl Admission {
    /// True when admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    /// Reason for a denial.
    pub fn reason(&self) -> Option<&DenialReason> {
        match self {
            Self::Admitted => None,
            Self::Denied(reason) => Some(reason),
        }
    }
}

impl std::fmt::Display for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admitted => write!(f, "OK"),
            Self::Denied(reason) => write!(f, "{}", reason),
        }
    }
}

/// Decides whether a call to an endpoint may be made and learns from outcomes.
///
/// Callers check [`can_admit`](Self::can_admit), record the attempt right
/// before the call, then report exactly one of success or failure, or
/// [`abandon_attempt`](Self::abandon_attempt) when the call is cancelled.
///
/// # Example
///
/// ```
/// use vigil_rate_limit::{AdmissionController, RollingConfig, RollingWindowLimiter};
/// use vigil_core::{EndpointId, SystemClock};
/// use std::sync::Arc;
///
/// # fn main() -> vigil_error::VigilResult<()> {
/// let limiter = RollingWindowLimiter::new(RollingConfig::default(), Arc::new(SystemClock))?;
/// let endpoint = EndpointId::from("user_lookup");
///
/// if limiter.can_admit(&endpoint)?.is_admitted() {
///     limiter.record_attempt(&endpoint)?;
///     // ... perform the call ...
///     limiter.record_success(&endpoint)?;
/// }
/// # Ok(())
/// # }
/// ```
pub trait AdmissionController: Send + Sync {
    /// Check whether a call may be made now.
    fn can_admit(&self, endpoint: &EndpointId) -> VigilResult<Admission>;

    /// Count a call that is about to be made.
    fn record_attempt(&self, endpoint: &EndpointId) -> VigilResult<()>;

    /// Report that the call completed.
    fn record_success(&self, endpoint: &EndpointId) -> VigilResult<()>;

    /// Report a rate-limit refusal or failure of the call.
    ///
    /// A remote `retry_after` takes precedence over the computed backoff.
    fn record_failure(&self, endpoint: &EndpointId, retry_after: Option<Duration>)
    -> VigilResult<()>;

    /// Give up on a recorded attempt whose outcome will never be reported.
    ///
    /// The attempt stays counted against the quota; only its in-flight mark
    /// is cleared.
    fn abandon_attempt(&self, endpoint: &EndpointId) -> VigilResult<()> {
        let _ = endpoint;
        Ok(())
    }

    /// Calls left in the current window or day.
    fn remaining_quota(&self, endpoint: &EndpointId) -> VigilResult<u32>;
}
