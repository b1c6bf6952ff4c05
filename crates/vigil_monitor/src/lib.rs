//! Strategic account monitoring for Vigil.
//!
//! The monitor polls configured accounts and keyword searches through an
//! [`AdmissionController`](vigil_rate_limit::AdmissionController), then the
//! evaluator turns fresh, relevant, unseen posts into scored
//! [`OpportunityRecord`](vigil_core::OpportunityRecord)s.
//!
//! # Example
//!
//! ```rust
//! use vigil_monitor::{MonitorConfig, OpportunityEvaluator, ProcessedContentSet};
//! use vigil_core::{ContentItem, Engagement, SystemClock};
//! use std::sync::Arc;
//!
//! let config = MonitorConfig::default();
//! let mut evaluator =
//!     OpportunityEvaluator::new(&config, ProcessedContentSet::new(), Arc::new(SystemClock));
//!
//! let item = ContentItem {
//!     id: "1".to_string(),
//!     text: "New Uniswap v4 hook for MEV protection".to_string(),
//!     author: "dabit3".to_string(),
//!     created_at: String::new(),
//!     engagement: Engagement::default(),
//! };
//!
//! let accepted = evaluator.evaluate(&[item.clone()], &config.tier_map());
//! assert_eq!(accepted.len(), 1);
//! assert!(accepted[0].is_high_priority());
//!
//! // Seen items are never accepted twice
//! assert!(evaluator.evaluate(&[item], &config.tier_map()).is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod evaluator;
mod monitor;
mod processed;
mod scorer;

pub use config::{MonitorConfig, MonitorConfigBuilder, ScoringWeights, ScoringWeightsBuilder};
pub use evaluator::{OpportunityEvaluator, parse_timestamp};
pub use monitor::{AccountMonitor, CycleReport, SkippedSource};
pub use processed::ProcessedContentSet;
pub use scorer::OpportunityScorer;
