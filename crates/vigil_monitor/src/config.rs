//! Monitoring targets and scoring weights.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_core::{AccountTierMap, EndpointId};
use vigil_error::ConfigError;

/// Weights of the relevance score.
///
/// `score = base + tier_1_bonus·[tier 1] + min(engagement_cap,
/// reactions / engagement_divisor × engagement_factor)`, clamped to `[0, 1]`.
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
pub struct ScoringWeights {
    /// Score every accepted item starts from
    #[serde(default = "default_base")]
    base: f64,
    /// Bonus for tier 1 authors
    #[serde(default = "default_tier_1_bonus")]
    tier_1_bonus: f64,
    /// Largest engagement bonus
    #[serde(default = "default_engagement_cap")]
    engagement_cap: f64,
    /// Reactions per engagement unit
    #[serde(default = "default_engagement_divisor")]
    engagement_divisor: f64,
    /// Bonus per engagement unit
    #[serde(default = "default_engagement_factor")]
    engagement_factor: f64,
}

fn default_base() -> f64 {
    0.7
}

fn default_tier_1_bonus() -> f64 {
    0.15
}

fn default_engagement_cap() -> f64 {
    0.15
}

fn default_engagement_divisor() -> f64 {
    100.0
}

fn default_engagement_factor() -> f64 {
    0.1
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: default_base(),
            tier_1_bonus: default_tier_1_bonus(),
            engagement_cap: default_engagement_cap(),
            engagement_divisor: default_engagement_divisor(),
            engagement_factor: default_engagement_factor(),
        }
    }
}

/// What to monitor and how to judge it.
///
/// ```toml
/// [monitor]
/// tier_1_accounts = ["VitalikButerin", "dabit3"]
/// keywords = ["uniswap", "hooks"]
/// recency_cutoff_secs = 7200
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
pub struct MonitorConfig {
    /// Highest-value accounts, polled first
    #[serde(default = "default_tier_1_accounts")]
    tier_1_accounts: Vec<String>,

    /// Other strategic accounts
    #[serde(default = "default_tier_2_accounts")]
    tier_2_accounts: Vec<String>,

    /// Case-insensitive substrings that make an item relevant
    #[serde(default = "default_keywords")]
    keywords: Vec<String>,

    /// Items at least this old are stale (seconds)
    #[serde(default = "default_recency_cutoff_secs")]
    recency_cutoff_secs: u64,

    /// Items requested per timeline
    #[serde(default = "default_page_size")]
    timeline_page_size: u32,

    /// Items requested per search
    #[serde(default = "default_page_size")]
    search_page_size: u32,

    /// Queries run after the timelines
    #[serde(default)]
    search_keywords: Vec<String>,

    /// Relevance score weights
    #[serde(default)]
    weights: ScoringWeights,

    /// Endpoint charged for timeline reads
    #[serde(default = "default_timeline_endpoint")]
    timeline_endpoint: EndpointId,

    /// Endpoint charged for keyword searches
    #[serde(default = "default_search_endpoint")]
    search_endpoint: EndpointId,
}

fn default_tier_1_accounts() -> Vec<String> {
    [
        "VitalikButerin",
        "dabit3",
        "PatrickAlphaC",
        "saucepoint",
        "TheCryptoLark",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_tier_2_accounts() -> Vec<String> {
    ["VirtualBacon0x", "Morecryptoonl", "AzFlin"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_keywords() -> Vec<String> {
    [
        "v4",
        "uniswap",
        "hooks",
        "unichain",
        "ai agent",
        "mev",
        "liquidity",
        "protocol",
        "smart contract",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_recency_cutoff_secs() -> u64 {
    2 * 3600
}

fn default_page_size() -> u32 {
    10
}

fn default_timeline_endpoint() -> EndpointId {
    EndpointId::from("user_timeline")
}

fn default_search_endpoint() -> EndpointId {
    EndpointId::from("search_tweets")
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tier_1_accounts: default_tier_1_accounts(),
            tier_2_accounts: default_tier_2_accounts(),
            keywords: default_keywords(),
            recency_cutoff_secs: default_recency_cutoff_secs(),
            timeline_page_size: default_page_size(),
            search_page_size: default_page_size(),
            search_keywords: Vec::new(),
            weights: ScoringWeights::default(),
            timeline_endpoint: default_timeline_endpoint(),
            search_endpoint: default_search_endpoint(),
        }
    }
}

impl MonitorConfig {
    /// Recency cutoff as a duration.
    pub fn recency_cutoff(&self) -> Duration {
        Duration::from_secs(self.recency_cutoff_secs)
    }

    /// Tier map built from the account lists.
    pub fn tier_map(&self) -> AccountTierMap {
        AccountTierMap::from_lists(&self.tier_1_accounts, &self.tier_2_accounts)
    }

    /// Validates monitoring settings.
    ///
    /// # Errors
    ///
    /// Returns an error if no keyword is configured, the engagement divisor
    /// is not positive, or a page size is outside what the feed accepts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::new("At least one monitor keyword is required"));
        }
        if self.weights.engagement_divisor <= 0.0 {
            return Err(ConfigError::new(format!(
                "engagement_divisor must be positive, got {}",
                self.weights.engagement_divisor
            )));
        }
        for (name, size) in [
            ("timeline_page_size", self.timeline_page_size),
            ("search_page_size", self.search_page_size),
        ] {
            if !(1..=100).contains(&size) {
                return Err(ConfigError::new(format!(
                    "{} must be between 1 and 100, got {}",
                    name, size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::AccountTier;

    #[test]
    fn defaults_validate() {
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_keywords_rejected() {
        let config = MonitorConfig::default().with_keywords(vec![" ".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn tier_map_follows_lists() {
        let tiers = MonitorConfig::default().tier_map();
        assert_eq!(tiers.tier_of("saucepoint"), AccountTier::Primary);
        assert_eq!(tiers.tier_of("azflin"), AccountTier::Secondary);
        assert_eq!(tiers.len(), 8);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: MonitorConfig = serde_json::from_str(r#"{"recency_cutoff_secs": 60}"#).unwrap();
        assert_eq!(config.recency_cutoff(), Duration::from_secs(60));
        assert_eq!(config.keywords().len(), 9);
        assert_eq!(*config.weights().base(), 0.7);
    }
}
