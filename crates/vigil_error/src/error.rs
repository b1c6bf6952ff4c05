//! Top-level error wrapper types.

use crate::{AdmissionError, ConfigError, FeedError, GeneratorError, JsonError, StorageError};

/// Every error condition the Vigil crates can report.
///
/// # Examples
///
/// ```
/// use vigil_error::{VigilError, JsonError};
///
/// let err: VigilError = JsonError::new("trailing comma").into();
/// assert!(format!("{}", err).contains("JSON Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum VigilErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// JSON serialization/deserialization error
    #[from(JsonError)]
    Json(JsonError),
    /// Persistence error
    #[from(StorageError)]
    Storage(StorageError),
    /// Terminal admission failure
    #[from(AdmissionError)]
    Admission(AdmissionError),
    /// Upstream feed failure
    #[from(FeedError)]
    Feed(FeedError),
    /// Reply generator failure
    #[from(GeneratorError)]
    Generator(GeneratorError),
}

/// Vigil error with kind discrimination.
///
/// # Examples
///
/// ```
/// use vigil_error::{VigilResult, ConfigError};
///
/// fn might_fail() -> VigilResult<()> {
///     Err(ConfigError::new("Missing field"))?
/// }
///
/// match might_fail() {
///     Ok(_) => println!("Success"),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Vigil Error: {}", _0)]
pub struct VigilError(Box<VigilErrorKind>);

impl VigilError {
    /// Create a new error from a kind.
    pub fn new(kind: VigilErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &VigilErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to VigilErrorKind
impl<T> From<T> for VigilError
where
    T: Into<VigilErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Vigil operations.
pub type VigilResult<T> = std::result::Result<T, VigilError>;
