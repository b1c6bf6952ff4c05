//! Deduplication, filtering and scoring of feed items.

use crate::{MonitorConfig, OpportunityScorer, ProcessedContentSet};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};
use vigil_core::{AccountTierMap, Clock, ContentItem, OpportunityRecord, OpportunityRecordBuilder};

/// Formats accepted for timestamps that carry no offset; read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Legacy feed timestamp, e.g. `Mon May 13 10:00:00 +0000 2024`.
const LEGACY_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Parse a feed timestamp. Offset-less values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.to_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, LEGACY_FORMAT) {
        return Some(parsed.to_utc());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Turns raw feed items into scored opportunities.
///
/// Each item, in order, is dropped when already processed, stale or without
/// a configured keyword. Survivors are marked processed (and persisted)
/// before they are scored.
#[derive(Debug)]
pub struct OpportunityEvaluator {
    keywords: Vec<String>,
    recency_cutoff: Duration,
    scorer: OpportunityScorer,
    processed: ProcessedContentSet,
    clock: Arc<dyn Clock>,
}

impl OpportunityEvaluator {
    /// Create an evaluator over `processed`.
    pub fn new(config: &MonitorConfig, processed: ProcessedContentSet, clock: Arc<dyn Clock>) -> Self {
        Self {
            keywords: config
                .keywords()
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            recency_cutoff: config.recency_cutoff(),
            scorer: OpportunityScorer::new(config.weights().clone()),
            processed,
            clock,
        }
    }

    /// Processed-content set.
    pub fn processed(&self) -> &ProcessedContentSet {
        &self.processed
    }

    /// Processed-content set, for operator actions.
    pub fn processed_mut(&mut self) -> &mut ProcessedContentSet {
        &mut self.processed
    }

    /// True unless the item is at least the cutoff old.
    ///
    /// Unparseable or empty timestamps count as recent.
    pub fn is_recent(&self, created_at: &str, now: DateTime<Utc>) -> bool {
        let Some(created) = parse_timestamp(created_at) else {
            if !created_at.trim().is_empty() {
                debug!(created_at, "Unparseable timestamp, treating as recent");
            }
            return true;
        };
        match (now - created).to_std() {
            Ok(age) => age < self.recency_cutoff,
            // Created in the future
            Err(_) => true,
        }
    }

    /// True when the text contains a configured keyword, ignoring case.
    pub fn matches_keywords(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|keyword| text.contains(keyword))
    }

    /// Evaluate `items`, returning opportunities in input order.
    #[instrument(skip(self, items, tiers), fields(items = items.len()))]
    pub fn evaluate(
        &mut self,
        items: &[ContentItem],
        tiers: &AccountTierMap,
    ) -> Vec<OpportunityRecord> {
        let now = self.clock.now();
        let mut opportunities = Vec::new();

        for item in items {
            if self.processed.contains(&item.id) {
                debug!(id = %item.id, "Already processed");
                continue;
            }
            if !self.is_recent(&item.created_at, now) {
                debug!(id = %item.id, created_at = %item.created_at, "Stale");
                continue;
            }
            if !self.matches_keywords(&item.text) {
                debug!(id = %item.id, "No keyword match");
                continue;
            }

            self.processed.insert(&item.id);

            let tier = tiers.tier_of(&item.author);
            let score = self.scorer.score(&item.engagement, tier);
            let record = OpportunityRecordBuilder::default()
                .content_id(item.id.clone())
                .account(item.author.clone())
                .text(item.text.clone())
                .created_at(item.created_at.clone())
                .metrics(item.engagement)
                .relevance_score(score)
                .tier(tier)
                .is_strategic(tiers.contains(&item.author))
                .discovered_at(now)
                .build();

            match record {
                Ok(record) => {
                    debug!(id = %item.id, score, %tier, "Accepted opportunity");
                    opportunities.push(record);
                }
                Err(e) => error!(id = %item.id, error = %e, "Failed to build opportunity"),
            }
        }

        debug!(accepted = opportunities.len(), "Evaluation finished");
        opportunities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_supported_format() {
        let expected: DateTime<Utc> = "2024-05-13T10:00:00Z".parse().unwrap();
        assert_eq!(parse_timestamp("2024-05-13T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-13T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-13T10:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-13 10:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("Mon May 13 10:00:00 +0000 2024"),
            Some(expected)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
