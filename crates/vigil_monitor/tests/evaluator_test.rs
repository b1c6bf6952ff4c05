//! Tests for deduplication, filtering and scoring of feed items.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{AccountTier, ContentItem, Engagement, ManualClock};
use vigil_monitor::{MonitorConfig, OpportunityEvaluator, ProcessedContentSet};

const NOW: &str = "2024-05-13T12:00:00Z";

fn at(timestamp: &str) -> DateTime<Utc> {
    timestamp.parse().unwrap()
}

fn item(id: &str, author: &str, text: &str, created_at: &str) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        text: text.to_string(),
        author: author.to_string(),
        created_at: created_at.to_string(),
        engagement: Engagement::default(),
    }
}

fn evaluator(processed: ProcessedContentSet) -> (OpportunityEvaluator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(at(NOW)));
    let evaluator = OpportunityEvaluator::new(&MonitorConfig::default(), processed, clock.clone());
    (evaluator, clock)
}

#[test]
fn test_processed_items_are_skipped() {
    let (mut evaluator, _) = evaluator(ProcessedContentSet::new());
    let tiers = MonitorConfig::default().tier_map();
    let post = item("1", "dabit3", "Uniswap v4 launch", "2024-05-13T11:30:00Z");

    assert_eq!(evaluator.evaluate(&[post.clone()], &tiers).len(), 1);
    assert!(evaluator.evaluate(&[post], &tiers).is_empty());
    assert!(evaluator.processed().contains("1"));
}

#[test]
fn test_duplicates_within_one_batch_count_once() {
    let (mut evaluator, _) = evaluator(ProcessedContentSet::new());
    let tiers = MonitorConfig::default().tier_map();
    let post = item("7", "dabit3", "MEV research", "");

    let accepted = evaluator.evaluate(&[post.clone(), post], &tiers);
    assert_eq!(accepted.len(), 1);
}

#[test]
fn test_item_exactly_at_cutoff_is_stale() {
    let (mut evaluator, _) = evaluator(ProcessedContentSet::new());
    let tiers = MonitorConfig::default().tier_map();

    let edge = item("1", "dabit3", "uniswap hooks", "2024-05-13T10:00:00Z");
    let inside = item("2", "dabit3", "uniswap hooks", "2024-05-13T10:00:01Z");

    let accepted = evaluator.evaluate(&[edge, inside], &tiers);
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].content_id(), "2");
    // Rejected items are not remembered
    assert!(!evaluator.processed().contains("1"));
}

#[test]
fn test_offsetless_timestamps_are_utc() {
    let (evaluator, _) = evaluator(ProcessedContentSet::new());
    let now = at(NOW);

    assert!(evaluator.is_recent("2024-05-13T10:30:00", now));
    assert!(!evaluator.is_recent("2024-05-13 09:59:59", now));
    // Same wall time with an offset is four hours earlier in UTC
    assert!(!evaluator.is_recent("2024-05-13T10:30:00+02:00", now));
}

#[test]
fn test_unparseable_and_future_timestamps_count_as_recent() {
    let (evaluator, _) = evaluator(ProcessedContentSet::new());
    let now = at(NOW);

    assert!(evaluator.is_recent("", now));
    assert!(evaluator.is_recent("two hours ago", now));
    assert!(evaluator.is_recent("2024-05-13T12:05:00Z", now));
}

#[test]
fn test_items_age_out_as_the_clock_moves() {
    let (mut evaluator, clock) = evaluator(ProcessedContentSet::new());
    let tiers = MonitorConfig::default().tier_map();

    clock.advance(Duration::from_secs(3 * 3600));
    let post = item("9", "dabit3", "uniswap", "2024-05-13T11:30:00Z");
    assert!(evaluator.evaluate(&[post], &tiers).is_empty());
}

#[test]
fn test_keywords_match_ignoring_case() {
    let (evaluator, _) = evaluator(ProcessedContentSet::new());

    assert!(evaluator.matches_keywords("Building an AI Agent on UNICHAIN"));
    assert!(evaluator.matches_keywords("smart contract audit"));
    assert!(!evaluator.matches_keywords("gm, coffee first"));
}

#[test]
fn test_output_keeps_input_order_and_scores() {
    let (mut evaluator, _) = evaluator(ProcessedContentSet::new());
    let tiers = MonitorConfig::default().tier_map();

    let mut popular = item("a", "AzFlin", "protocol liquidity update", "");
    popular.engagement = Engagement {
        retweets: 30,
        likes: 20,
        replies: 4,
    };
    let items = vec![
        popular,
        item("b", "gm_poster", "gm", ""),
        item("c", "VitalikButerin", "thoughts on MEV", ""),
        item("d", "stranger", "new hooks repo", ""),
    ];

    let accepted = evaluator.evaluate(&items, &tiers);
    let ids: Vec<&str> = accepted.iter().map(|o| o.content_id().as_str()).collect();
    assert_eq!(ids, vec!["a", "c", "d"]);

    assert!((accepted[0].relevance_score() - 0.75).abs() < 1e-9);
    assert_eq!(*accepted[0].tier(), AccountTier::Secondary);
    assert!(*accepted[0].is_strategic());

    assert!((accepted[1].relevance_score() - 0.85).abs() < 1e-9);
    assert_eq!(*accepted[1].tier(), AccountTier::Primary);
    assert!(accepted[1].is_high_priority());

    // Unknown authors default to tier 2 and are not strategic
    assert_eq!(*accepted[2].tier(), AccountTier::Secondary);
    assert!(!*accepted[2].is_strategic());
    assert_eq!(*accepted[2].discovered_at(), at(NOW));
}

#[test]
fn test_processed_ids_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("processed_tweets.json");
    let tiers = MonitorConfig::default().tier_map();
    let post = item("1790", "dabit3", "uniswap v4", "");

    {
        let (mut evaluator, _) = evaluator(ProcessedContentSet::open(&path));
        assert_eq!(evaluator.evaluate(&[post.clone()], &tiers).len(), 1);
    }

    let (mut evaluator, _) = evaluator(ProcessedContentSet::open(&path));
    assert!(evaluator.evaluate(&[post.clone()], &tiers).is_empty());

    assert!(evaluator.processed_mut().forget("1790"));
    assert_eq!(evaluator.evaluate(&[post], &tiers).len(), 1);
}

#[test]
fn test_clear_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("processed_tweets.json");

    let mut set = ProcessedContentSet::open(&path);
    assert_eq!(set.extend(["1", "2", "3"]), 3);
    assert_eq!(set.clear(), 3);

    let reopened = ProcessedContentSet::open(&path);
    assert!(reopened.is_empty());
}
