//! Terminal failures on the deferred admission paths.

/// Admission failure conditions.
///
/// These are only produced when a caller asked the system to *wait* for
/// admission and the wait could not end in a successful call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum AdmissionErrorKind {
    /// Queued request failed on every permitted attempt
    #[display(
        "Request to {} failed after {} attempts: {}",
        endpoint,
        attempts,
        last_error
    )]
    RetriesExhausted {
        /// Endpoint the request targeted
        endpoint: String,
        /// Number of attempts made
        attempts: u32,
        /// Message of the final failure
        last_error: String,
    },
    /// Deadline passed before the endpoint became admissible
    #[display("Gave up waiting for {} after {}s", endpoint, waited_secs)]
    WaitTimedOut {
        /// Endpoint the request targeted
        endpoint: String,
        /// Seconds spent waiting
        waited_secs: u64,
    },
}

/// Admission error with location tracking.
///
/// # Examples
///
/// ```
/// use vigil_error::{AdmissionError, AdmissionErrorKind};
///
/// let err = AdmissionError::new(AdmissionErrorKind::WaitTimedOut {
///     endpoint: "search_tweets".to_string(),
///     waited_secs: 7200,
/// });
/// assert!(format!("{}", err).contains("7200s"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Admission Error: {} at line {} in {}", kind, line, file)]
pub struct AdmissionError {
    kind: AdmissionErrorKind,
    line: u32,
    file: &'static str,
}

impl AdmissionError {
    /// Create a new admission error with caller location tracking.
    #[track_caller]
    pub fn new(kind: AdmissionErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &AdmissionErrorKind {
        &self.kind
    }
}
