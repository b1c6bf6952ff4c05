//! Scored engagement opportunities.

use crate::{AccountTier, DraftReply, Engagement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A feed item that survived filtering and received a relevance score.
///
/// Records are immutable once built; enrichment produces an
/// [`EnrichedOpportunity`] instead of modifying the record.
///
/// # Examples
///
/// ```
/// use vigil_core::{AccountTier, Engagement, OpportunityRecordBuilder};
///
/// let record = OpportunityRecordBuilder::default()
///     .content_id("42")
///     .account("dabit3")
///     .text("uniswap hooks thread")
///     .created_at("2024-05-13T10:00:00Z")
///     .metrics(Engagement::default())
///     .relevance_score(0.85)
///     .tier(AccountTier::Primary)
///     .is_strategic(true)
///     .discovered_at(chrono::Utc::now())
///     .build()
///     .unwrap();
///
/// assert_eq!(record.content_id(), "42");
/// assert!(record.is_high_priority());
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_builder::Builder,
)]
#[builder(setter(into))]
pub struct OpportunityRecord {
    /// Identifier of the source item
    content_id: String,
    /// Author handle
    account: String,
    /// Item text
    text: String,
    /// Creation timestamp as delivered by the feed
    created_at: String,
    /// Engagement at discovery time
    metrics: Engagement,
    /// Relevance in `[0, 1]`
    relevance_score: f64,
    /// Tier of the author
    tier: AccountTier,
    /// Whether the author is a configured strategic account
    is_strategic: bool,
    /// When the evaluator accepted the item
    discovered_at: DateTime<Utc>,
}

impl OpportunityRecord {
    /// Score at or above which downstream enrichment treats an opportunity as urgent.
    pub const HIGH_PRIORITY_THRESHOLD: f64 = 0.85;

    /// True when the relevance score meets the high priority threshold.
    pub fn is_high_priority(&self) -> bool {
        self.relevance_score >= Self::HIGH_PRIORITY_THRESHOLD
    }
}

/// An opportunity paired with a drafted reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct EnrichedOpportunity {
    /// The scored record
    opportunity: OpportunityRecord,
    /// Draft produced by the generator
    draft: DraftReply,
    /// Score used for ranking after enrichment
    priority_score: f64,
}

impl EnrichedOpportunity {
    /// Pair a record with its draft.
    ///
    /// Tier 1 opportunities are never ranked below the high priority threshold.
    pub fn new(opportunity: OpportunityRecord, draft: DraftReply) -> Self {
        let mut priority_score = *opportunity.relevance_score();
        if *opportunity.tier() == AccountTier::Primary {
            priority_score = priority_score.max(OpportunityRecord::HIGH_PRIORITY_THRESHOLD);
        }
        Self {
            opportunity,
            draft,
            priority_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(score: f64, tier: AccountTier) -> OpportunityRecord {
        OpportunityRecordBuilder::default()
            .content_id("1")
            .account("someone")
            .text("mev research")
            .created_at("")
            .metrics(Engagement::default())
            .relevance_score(score)
            .tier(tier)
            .is_strategic(tier == AccountTier::Primary)
            .discovered_at(Utc::now())
            .build()
            .unwrap()
    }

    fn draft() -> DraftReply {
        DraftReply {
            text: "Great point".to_string(),
            voice_score: 0.9,
            quality_score: 0.8,
        }
    }

    #[test]
    fn tier_one_is_floored_at_threshold() {
        let enriched = EnrichedOpportunity::new(record(0.72, AccountTier::Primary), draft());
        assert_eq!(*enriched.priority_score(), 0.85);
    }

    #[test]
    fn tier_two_keeps_its_score() {
        let enriched = EnrichedOpportunity::new(record(0.72, AccountTier::Secondary), draft());
        assert_eq!(*enriched.priority_score(), 0.72);
    }

    #[test]
    fn builder_requires_every_field() {
        let result = OpportunityRecordBuilder::default().content_id("1").build();
        assert!(result.is_err());
    }
}
