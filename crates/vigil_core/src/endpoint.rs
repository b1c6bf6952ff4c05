//! Endpoint identifiers and classes.

use serde::{Deserialize, Serialize};

/// Name of a logical remote operation with its own quota and backoff.
///
/// Identifiers are opaque strings so that new endpoints can be configured
/// without a code change.
///
/// # Examples
///
/// ```
/// use vigil_core::EndpointId;
///
/// let endpoint = EndpointId::from("search_tweets");
/// assert_eq!(endpoint.as_str(), "search_tweets");
/// assert_eq!(endpoint.to_string(), "search_tweets");
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    /// Create an endpoint identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EndpointId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for EndpointId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether an endpoint reads from or writes to the platform.
///
/// Write endpoints are subject to post spacing, the peak-hour bias and
/// longer backoff.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    strum::EnumIter,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    /// Fetches content
    #[default]
    #[display("read")]
    Read,
    /// Publishes content
    #[display("write")]
    Write,
}

impl EndpointClass {
    /// True for write endpoints.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}
