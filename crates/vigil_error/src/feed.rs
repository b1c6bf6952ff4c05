//! Errors reported by the upstream social feed.

use std::time::Duration;

/// Feed failure conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FeedErrorKind {
    /// Remote side refused the call because of rate limiting
    #[display("Rate limited by remote (retry after {:?}s)", retry_after_secs)]
    RateLimited {
        /// Server supplied retry hint, in seconds
        retry_after_secs: Option<u64>,
    },
    /// Account or resource does not exist
    #[display("Not found: {}", _0)]
    NotFound(String),
    /// Transport or server failure
    #[display("Request failed: {}", _0)]
    Request(String),
}

/// Feed error with location tracking.
///
/// # Examples
///
/// ```
/// use vigil_error::{FeedError, FeedErrorKind};
/// use std::time::Duration;
///
/// let err = FeedError::new(FeedErrorKind::RateLimited { retry_after_secs: Some(900) });
/// assert!(err.is_rate_limit());
/// assert_eq!(err.retry_after(), Some(Duration::from_secs(900)));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Feed Error: {} at line {} in {}", kind, line, file)]
pub struct FeedError {
    kind: FeedErrorKind,
    line: u32,
    file: &'static str,
}

impl FeedError {
    /// Create a new feed error with caller location tracking.
    #[track_caller]
    pub fn new(kind: FeedErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &FeedErrorKind {
        &self.kind
    }

    /// True when the remote reported a rate-limit hit.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self.kind, FeedErrorKind::RateLimited { .. })
    }

    /// True when repeating the same request could succeed.
    ///
    /// A missing account is a property of the request, not of the endpoint,
    /// so it does not feed the backoff controller either.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, FeedErrorKind::NotFound(_))
    }

    /// Server supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            FeedErrorKind::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(secs)),
            _ => None,
        }
    }
}
