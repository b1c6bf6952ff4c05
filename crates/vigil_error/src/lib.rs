//! Error types for the Vigil library.
//!
//! This crate provides the foundation error types used throughout the Vigil workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All constructors use `#[track_caller]` for automatic location capture
//!
//! Admission *denials* are not errors. A denied request is a normal outcome
//! reported by the admission controllers; the types here cover configuration
//! defects, persistence problems, remote failures and terminal queue failures.
//!
//! # Examples
//!
//! ```
//! use vigil_error::{ConfigError, VigilResult};
//!
//! fn load() -> VigilResult<()> {
//!     Err(ConfigError::new("peak_hours must be below 24"))?
//! }
//!
//! assert!(load().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod admission;
mod config;
mod error;
mod feed;
mod generator;
mod json;
mod storage;

pub use admission::{AdmissionError, AdmissionErrorKind};
pub use config::ConfigError;
pub use error::{VigilError, VigilErrorKind, VigilResult};
pub use feed::{FeedError, FeedErrorKind};
pub use generator::GeneratorError;
pub use json::JsonError;
pub use storage::{StorageError, StorageErrorKind};
