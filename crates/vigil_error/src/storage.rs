//! Storage error types.

/// Kinds of storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum StorageErrorKind {
    /// Failed to create storage directory
    #[display("Failed to create storage directory: {}", _0)]
    DirectoryCreation(String),
    /// Failed to write file
    #[display("Failed to write file: {}", _0)]
    FileWrite(String),
    /// Failed to read file
    #[display("Failed to read file: {}", _0)]
    FileRead(String),
    /// Persisted document could not be decoded
    #[display("Malformed persisted state in {}: {}", path, reason)]
    Malformed {
        /// Path of the offending document
        path: String,
        /// Decoder message
        reason: String,
    },
    /// Persisted document was written by a newer schema
    #[display("Unsupported schema version {} in {} (supported up to {})", found, path, supported)]
    UnsupportedVersion {
        /// Path of the offending document
        path: String,
        /// Version recorded in the document
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },
}

/// Storage error with location tracking.
///
/// # Examples
///
/// ```
/// use vigil_error::{StorageError, StorageErrorKind};
///
/// let err = StorageError::new(StorageErrorKind::FileRead("/data/cache.json".to_string()));
/// assert!(format!("{}", err).contains("Failed to read file"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Storage Error: {} at line {} in {}", kind, line, file)]
pub struct StorageError {
    /// The kind of error that occurred
    pub kind: StorageErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl StorageError {
    /// Create a new storage error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: StorageErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
