//! Tests for the calendar-day admission controller.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vigil_core::{EndpointClass, EndpointId, ManualClock};
use vigil_error::VigilErrorKind;
use vigil_rate_limit::{
    Admission, AdmissionController, CalendarConfig, CalendarDayLimiter, DailyQuota, DenialReason,
    EndpointPhase, SearchStrategy, TokioClock,
};

fn at(timestamp: &str) -> DateTime<Utc> {
    timestamp.parse().unwrap()
}

fn config() -> CalendarConfig {
    CalendarConfig::default().with_utc_offset_minutes(Some(0))
}

fn limiter(config: CalendarConfig) -> (CalendarDayLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(at("2024-05-13T08:00:00Z")));
    let limiter = CalendarDayLimiter::new(config, clock.clone()).unwrap();
    (limiter, clock)
}

#[test]
fn test_minimum_delay_counts_from_success() {
    let (limiter, clock) = limiter(config());
    let search = EndpointId::from("search_tweets");

    assert!(limiter.can_admit(&search).unwrap().is_admitted());
    limiter.record_attempt(&search).unwrap();
    limiter.record_success(&search).unwrap();

    assert_eq!(
        limiter.can_admit(&search).unwrap(),
        Admission::Denied(DenialReason::MinimumDelay {
            remaining_secs: 21_600
        })
    );
    assert_eq!(limiter.remaining_quota(&search).unwrap(), 2);

    clock.advance(Duration::from_secs(21_600));
    assert!(limiter.can_admit(&search).unwrap().is_admitted());
}

#[test]
fn test_attempt_without_outcome_is_pending() {
    let (limiter, _) = limiter(config());
    let timeline = EndpointId::from("user_timeline");
    limiter.record_attempt(&timeline).unwrap();
    assert_eq!(
        limiter.can_admit(&timeline).unwrap(),
        Admission::Denied(DenialReason::PendingResult)
    );
}

#[test]
fn test_quota_exhausts_until_next_local_day() {
    let (limiter, clock) = limiter(config());
    let lookup = EndpointId::from("user_lookup");

    for _ in 0..5 {
        assert!(limiter.can_admit(&lookup).unwrap().is_admitted());
        limiter.record_attempt(&lookup).unwrap();
        limiter.record_success(&lookup).unwrap();
        clock.advance(Duration::from_secs(1800));
    }

    assert_eq!(
        limiter.can_admit(&lookup).unwrap(),
        Admission::Denied(DenialReason::DailyQuotaExhausted { used: 5, quota: 5 })
    );
    assert_eq!(limiter.phase(&lookup).unwrap(), EndpointPhase::QuotaExhausted);
    assert_eq!(
        limiter.next_available_time(&lookup).unwrap(),
        at("2024-05-14T00:00:00Z")
    );

    clock.set(at("2024-05-14T00:00:00Z"));
    assert!(limiter.can_admit(&lookup).unwrap().is_admitted());
    assert_eq!(limiter.remaining_quota(&lookup).unwrap(), 5);
}

#[test]
fn test_rate_limit_blocks_with_class_base() {
    let (limiter, clock) = limiter(config());
    let lookup = EndpointId::from("user_lookup");

    limiter.record_attempt(&lookup).unwrap();
    limiter.record_failure(&lookup, None).unwrap();
    assert_eq!(
        limiter.can_admit(&lookup).unwrap(),
        Admission::Denied(DenialReason::Blocked {
            remaining_secs: 3600
        })
    );
    assert_eq!(limiter.phase(&lookup).unwrap(), EndpointPhase::Backoff);

    clock.advance(Duration::from_secs(3600));
    assert!(limiter.can_admit(&lookup).unwrap().is_admitted());
}

#[test]
fn test_write_endpoints_back_off_longer() {
    let mut endpoints = BTreeMap::new();
    endpoints.insert(
        EndpointId::from("create_tweet"),
        DailyQuota::new(1, 0, EndpointClass::Write),
    );
    let (limiter, _) = limiter(config().with_endpoints(endpoints));
    let tweet = EndpointId::from("create_tweet");

    limiter.record_attempt(&tweet).unwrap();
    limiter.record_failure(&tweet, None).unwrap();
    assert_eq!(
        limiter.can_admit(&tweet).unwrap(),
        Admission::Denied(DenialReason::Blocked {
            remaining_secs: 7200
        })
    );
}

#[test]
fn test_failure_cooldown_measured_from_last_success() {
    let mut endpoints = BTreeMap::new();
    endpoints.insert(
        EndpointId::from("probe"),
        DailyQuota::new(10, 0, EndpointClass::Read),
    );
    let (limiter, clock) = limiter(config().with_endpoints(endpoints));
    let probe = EndpointId::from("probe");

    limiter.record_attempt(&probe).unwrap();
    limiter.record_success(&probe).unwrap();
    limiter.record_attempt(&probe).unwrap();
    limiter
        .record_failure(&probe, Some(Duration::from_secs(1)))
        .unwrap();

    clock.advance(Duration::from_secs(1));
    assert_eq!(
        limiter.can_admit(&probe).unwrap(),
        Admission::Denied(DenialReason::ExponentialBackoff {
            remaining_secs: 599
        })
    );

    clock.advance(Duration::from_secs(599));
    assert!(limiter.can_admit(&probe).unwrap().is_admitted());
}

#[test]
fn test_new_day_resets_failures() {
    let (limiter, clock) = limiter(config());
    let lookup = EndpointId::from("user_lookup");

    limiter.record_attempt(&lookup).unwrap();
    limiter.record_failure(&lookup, None).unwrap();
    clock.set(at("2024-05-14T09:00:00Z"));

    let status = limiter.status_summary();
    let lookup_status = &status.endpoints[&lookup];
    assert_eq!(lookup_status.consecutive_failures, 0);
    assert_eq!(lookup_status.used, 0);
    assert!(lookup_status.can_request);
    assert_eq!(lookup_status.reason, "OK");
}

#[test]
fn test_unknown_endpoint_is_config_error() {
    let (limiter, _) = limiter(config());
    let err = limiter
        .can_admit(&EndpointId::from("list_members"))
        .unwrap_err();
    assert!(matches!(err.kind(), VigilErrorKind::Config(_)));
}

#[test]
fn test_status_summary_totals() {
    let (limiter, _) = limiter(config());
    let search = EndpointId::from("search_tweets");
    limiter.record_attempt(&search).unwrap();

    let status = limiter.status_summary();
    assert_eq!(status.endpoints.len(), 4);
    assert_eq!(status.total_used_today, 1);
    assert_eq!(status.total_daily_quota, 18);
    assert_eq!(status.next_reset, at("2024-05-14T00:00:00Z"));

    let search_status = &status.endpoints[&search];
    assert!(!search_status.can_request);
    assert_eq!(search_status.reason, "Request already pending result");
    assert_eq!(search_status.phase, EndpointPhase::PendingResult);
}

#[test]
fn test_search_strategy() {
    let (limiter, _) = limiter(config());
    assert_eq!(
        limiter.search_strategy().unwrap(),
        SearchStrategy::Search {
            remaining_quota_today: 3,
            keywords_per_search: 1,
            delay_between_searches_secs: 21_600
        }
    );

    let search = EndpointId::from("search_tweets");
    limiter.record_attempt(&search).unwrap();
    limiter.record_success(&search).unwrap();

    match limiter.search_strategy().unwrap() {
        SearchStrategy::Wait {
            reason,
            next_in_secs,
            next_at,
        } => {
            assert_eq!(reason, "Minimum delay not met: 21600s remaining");
            assert_eq!(next_in_secs, 21_600);
            assert_eq!(next_at, at("2024-05-13T14:00:00Z"));
        }
        other => panic!("expected wait, got {:?}", other),
    }
}

#[test]
fn test_force_reset_clears_everything() {
    let (limiter, _) = limiter(config());
    let lookup = EndpointId::from("user_lookup");
    limiter.record_attempt(&lookup).unwrap();
    limiter.record_failure(&lookup, None).unwrap();

    limiter.force_reset(&lookup).unwrap();
    assert!(limiter.can_admit(&lookup).unwrap().is_admitted());
    assert_eq!(limiter.remaining_quota(&lookup).unwrap(), 5);
}

#[test]
fn test_state_survives_reopen_without_pending_flag() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("rate_limits").join("free_tier_limits.json");
    let clock = Arc::new(ManualClock::new(at("2024-05-13T08:00:00Z")));
    let timeline = EndpointId::from("user_timeline");

    {
        let limiter = CalendarDayLimiter::open(config(), clock.clone(), &path).unwrap();
        limiter.record_attempt(&timeline).unwrap();
        limiter.record_attempt(&timeline).unwrap();
    }

    let reopened = CalendarDayLimiter::open(config(), clock, &path).unwrap();
    assert_eq!(reopened.remaining_quota(&timeline).unwrap(), 6);
    assert!(reopened.can_admit(&timeline).unwrap().is_admitted());
}

#[test]
fn test_original_format_document_keeps_todays_usage() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("free_tier_limits.json");
    std::fs::write(
        &path,
        r#"{
            "search_tweets": {
                "endpoint": "search_tweets",
                "daily_quota": 3,
                "daily_used": 3,
                "last_reset": "2024-05-13",
                "blocked_until": null,
                "last_success": 1715587200.5,
                "consecutive_failures": 0
            },
            "user_timeline": {
                "endpoint": "user_timeline",
                "daily_quota": 8,
                "daily_used": 1,
                "last_reset": "2024-05-13",
                "blocked_until": 1715598000.0,
                "last_success": null,
                "consecutive_failures": 1
            }
        }"#,
    )
    .unwrap();
    let clock = Arc::new(ManualClock::new(at("2024-05-13T10:00:00Z")));

    let limiter = CalendarDayLimiter::open(config(), clock, &path).unwrap();

    let search = EndpointId::from("search_tweets");
    let denial = limiter.can_admit(&search).unwrap();
    assert_eq!(denial.to_string(), "Daily quota exhausted: 3/3");
    assert_eq!(
        limiter.document()[&search].last_success,
        Some(at("2024-05-13T08:00:00.500Z"))
    );

    let timeline = EndpointId::from("user_timeline");
    assert_eq!(
        limiter.can_admit(&timeline).unwrap(),
        Admission::Denied(DenialReason::Blocked {
            remaining_secs: 3600
        })
    );
    assert_eq!(limiter.remaining_quota(&timeline).unwrap(), 7);
}

#[test]
fn test_unanswered_attempt_expires_after_timeout() {
    let (limiter, clock) = limiter(config().with_pending_timeout_secs(120));
    let timeline = EndpointId::from("user_timeline");
    limiter.record_attempt(&timeline).unwrap();

    clock.advance(Duration::from_secs(119));
    assert_eq!(
        limiter.can_admit(&timeline).unwrap(),
        Admission::Denied(DenialReason::PendingResult)
    );

    clock.advance(Duration::from_secs(1));
    assert!(limiter.can_admit(&timeline).unwrap().is_admitted());
    assert_eq!(limiter.remaining_quota(&timeline).unwrap(), 7);
}

#[test]
fn test_new_day_clears_unanswered_attempt() {
    let (limiter, clock) = limiter(config().with_pending_timeout_secs(3 * 86_400));
    let timeline = EndpointId::from("user_timeline");
    limiter.record_attempt(&timeline).unwrap();
    assert_eq!(limiter.phase(&timeline).unwrap(), EndpointPhase::PendingResult);

    clock.set(at("2024-05-14T00:00:00Z"));
    assert_eq!(limiter.phase(&timeline).unwrap(), EndpointPhase::Available);
    assert!(limiter.can_admit(&timeline).unwrap().is_admitted());
    assert_eq!(limiter.remaining_quota(&timeline).unwrap(), 8);
}

#[test]
fn test_abandoned_attempt_stays_counted() {
    let (limiter, _) = limiter(config());
    let timeline = EndpointId::from("user_timeline");
    limiter.record_attempt(&timeline).unwrap();
    limiter.abandon_attempt(&timeline).unwrap();

    assert!(limiter.can_admit(&timeline).unwrap().is_admitted());
    assert_eq!(limiter.remaining_quota(&timeline).unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_available_returns_when_delay_passes() {
    let clock = Arc::new(TokioClock::starting_at(at("2024-05-13T08:00:00Z")));
    let limiter = CalendarDayLimiter::new(config(), clock).unwrap();
    let lookup = EndpointId::from("user_lookup");
    limiter.record_attempt(&lookup).unwrap();
    limiter.record_success(&lookup).unwrap();

    let started = tokio::time::Instant::now();
    let available = limiter
        .wait_until_available(&lookup, Duration::from_secs(3600))
        .await
        .unwrap();
    assert!(available);
    assert_eq!(started.elapsed(), Duration::from_secs(1800));
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_available_gives_up_at_deadline() {
    let clock = Arc::new(TokioClock::starting_at(at("2024-05-13T08:00:00Z")));
    let limiter = CalendarDayLimiter::new(config(), clock).unwrap();
    let search = EndpointId::from("search_tweets");
    limiter.record_attempt(&search).unwrap();
    limiter.record_success(&search).unwrap();

    let started = tokio::time::Instant::now();
    let available = limiter
        .wait_until_available(&search, Duration::from_secs(150))
        .await
        .unwrap();
    assert!(!available);
    assert_eq!(started.elapsed(), Duration::from_secs(150));
    assert_eq!(limiter.remaining_quota(&search).unwrap(), 2);
}
