//! Relevance scoring of accepted content.

use crate::ScoringWeights;
use vigil_core::{AccountTier, Engagement};

/// Computes relevance scores from tier and engagement.
///
/// # Examples
///
/// ```
/// use vigil_monitor::{OpportunityScorer, ScoringWeights};
/// use vigil_core::{AccountTier, Engagement};
///
/// let scorer = OpportunityScorer::new(ScoringWeights::default());
/// let quiet = Engagement::default();
/// assert!((scorer.score(&quiet, AccountTier::Primary) - 0.85).abs() < 1e-9);
/// assert!((scorer.score(&quiet, AccountTier::Secondary) - 0.70).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OpportunityScorer {
    weights: ScoringWeights,
}

impl OpportunityScorer {
    /// Create a scorer.
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Weights in use.
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score in `[0, 1]`.
    pub fn score(&self, engagement: &Engagement, tier: AccountTier) -> f64 {
        let w = &self.weights;
        let mut score = *w.base();
        if tier == AccountTier::Primary {
            score += w.tier_1_bonus();
        }
        let units = engagement.reactions() as f64 / w.engagement_divisor();
        score += (units * w.engagement_factor()).min(*w.engagement_cap());
        score.clamp(0.0, 1.0)
    }
}

impl Default for OpportunityScorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default())
    }
}
