//! Request admission for Vigil.
//!
//! Two controllers decide when a call to the social platform may be made:
//!
//! - [`RollingWindowLimiter`]: calls per trailing window, with spacing
//!   between writes and a peak-hour bias for write endpoints
//! - [`CalendarDayLimiter`]: tiny calendar-day quotas with long delays
//!   between successful calls, for free-tier accounts
//!
//! Both implement [`AdmissionController`]. The [`RequestDispatcher`] puts a
//! request cache and a priority queue in front of the rolling-window
//! controller. Its [`HeaderRateLimitDetector`] reads the quota the server
//! reports in response headers and hands it to the limiter.
//!
//! # Example
//!
//! ```rust
//! use vigil_rate_limit::{AdmissionController, CalendarConfig, CalendarDayLimiter};
//! use vigil_core::{EndpointId, SystemClock};
//! use std::sync::Arc;
//!
//! # fn main() -> vigil_error::VigilResult<()> {
//! let limiter = CalendarDayLimiter::new(CalendarConfig::default(), Arc::new(SystemClock))?;
//! let search = EndpointId::from("search_tweets");
//!
//! assert_eq!(limiter.remaining_quota(&search)?, 3);
//! limiter.record_attempt(&search)?;
//! // A second call waits for the first to report back
//! assert!(!limiter.can_admit(&search)?.is_admitted());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod admission;
mod backoff;
mod calendar;
mod clock;
mod config;
mod detector;
mod dispatcher;
mod ledger;
mod queue;
mod rolling;
mod timestamp;

pub use admission::{Admission, AdmissionController, DenialReason};
pub use backoff::{BackoffPolicy, BackoffState};
pub use calendar::{
    CalendarDayLimiter, CalendarDocument, CalendarRecord, EndpointPhase, EndpointStatus,
    FreeTierStatus, SearchStrategy,
};
pub use clock::TokioClock;
pub use config::{
    CalendarConfig, CalendarConfigBuilder, DailyQuota, EndpointLimit, RollingConfig,
    RollingConfigBuilder,
};
pub use detector::{HeaderRateLimitDetector, RateLimitSnapshot, parse_snapshot};
pub use dispatcher::{FetchOptions, Fetched, PostingOutlook, RequestDispatcher};
pub use ledger::{DailyLedger, RollingLedger};
pub use queue::{HIGHEST_PRIORITY, LOWEST_PRIORITY, PendingQueue, PriorityRequest};
pub use rolling::{
    EndpointUsage, EngagementWindow, RollingDocument, RollingRecord, RollingWindowLimiter,
};
