//! Contracts with the reply generator.

use crate::AccountTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input handed to a reply generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Text being replied to
    pub text: String,
    /// Author of that text
    pub author: String,
    /// Tier of the author
    pub tier: AccountTier,
    /// Free-form context values
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

/// A drafted reply with its quality estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftReply {
    /// Reply text
    pub text: String,
    /// How well the draft matches the account voice (0..=1)
    pub voice_score: f64,
    /// Overall draft quality (0..=1)
    pub quality_score: f64,
}
