//! Tests for the monitoring cycle and opportunity enrichment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_core::{
    AccountTier, ContentItem, DraftReply, EndpointId, Engagement, FeedClient, GenerationRequest,
    ManualClock, ReplyGenerator,
};
use vigil_error::{FeedError, FeedErrorKind, GeneratorError, VigilErrorKind};
use vigil_monitor::{AccountMonitor, MonitorConfig, OpportunityEvaluator, ProcessedContentSet};
use vigil_rate_limit::{
    Admission, AdmissionController, CalendarConfig, CalendarDayLimiter, DenialReason,
    EndpointPhase,
};

const NOW: &str = "2024-05-13T12:00:00Z";

fn at(timestamp: &str) -> DateTime<Utc> {
    timestamp.parse().unwrap()
}

fn post(id: &str, author: &str, text: &str) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        text: text.to_string(),
        author: author.to_string(),
        created_at: "2024-05-13T11:00:00Z".to_string(),
        engagement: Engagement::default(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Timeline(String, u32),
    Search(String, u32),
}

/// Feed answering from canned responses and recording every call.
#[derive(Default)]
struct ScriptedFeed {
    timelines: HashMap<String, Result<Vec<ContentItem>, FeedError>>,
    searches: HashMap<String, Result<Vec<ContentItem>, FeedError>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedFeed {
    fn timeline(mut self, account: &str, response: Result<Vec<ContentItem>, FeedError>) -> Self {
        self.timelines.insert(account.to_string(), response);
        self
    }

    fn search(mut self, keyword: &str, response: Result<Vec<ContentItem>, FeedError>) -> Self {
        self.searches.insert(keyword.to_string(), response);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedClient for ScriptedFeed {
    async fn user_timeline(
        &self,
        account: &str,
        max_results: u32,
    ) -> Result<Vec<ContentItem>, FeedError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Timeline(account.to_string(), max_results));
        self.timelines
            .get(account)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn search(&self, keyword: &str, max_results: u32) -> Result<Vec<ContentItem>, FeedError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Search(keyword.to_string(), max_results));
        self.searches
            .get(keyword)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Controller that admits everything and logs the protocol calls.
#[derive(Default)]
struct RecordingAdmission {
    denied: Vec<EndpointId>,
    events: Mutex<Vec<String>>,
}

impl RecordingAdmission {
    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl AdmissionController for RecordingAdmission {
    fn can_admit(&self, endpoint: &EndpointId) -> vigil_error::VigilResult<Admission> {
        if self.denied.contains(endpoint) {
            return Ok(Admission::Denied(DenialReason::MinimumDelay {
                remaining_secs: 60,
            }));
        }
        Ok(Admission::Admitted)
    }

    fn record_attempt(&self, endpoint: &EndpointId) -> vigil_error::VigilResult<()> {
        self.log(format!("attempt {}", endpoint));
        Ok(())
    }

    fn record_success(&self, endpoint: &EndpointId) -> vigil_error::VigilResult<()> {
        self.log(format!("success {}", endpoint));
        Ok(())
    }

    fn record_failure(
        &self,
        endpoint: &EndpointId,
        retry_after: Option<Duration>,
    ) -> vigil_error::VigilResult<()> {
        self.log(format!(
            "failure {} {:?}",
            endpoint,
            retry_after.map(|d| d.as_secs())
        ));
        Ok(())
    }

    fn abandon_attempt(&self, endpoint: &EndpointId) -> vigil_error::VigilResult<()> {
        self.log(format!("abandon {}", endpoint));
        Ok(())
    }

    fn remaining_quota(&self, _endpoint: &EndpointId) -> vigil_error::VigilResult<u32> {
        Ok(u32::MAX)
    }
}

/// Feed whose calls never complete.
struct SilentFeed;

#[async_trait]
impl FeedClient for SilentFeed {
    async fn user_timeline(
        &self,
        _account: &str,
        _max_results: u32,
    ) -> Result<Vec<ContentItem>, FeedError> {
        std::future::pending().await
    }

    async fn search(
        &self,
        _keyword: &str,
        _max_results: u32,
    ) -> Result<Vec<ContentItem>, FeedError> {
        std::future::pending().await
    }
}

struct FixedGenerator {
    requests: Mutex<Vec<GenerationRequest>>,
    fail: bool,
}

impl FixedGenerator {
    fn new(fail: bool) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail,
        }
    }
}

#[async_trait]
impl ReplyGenerator for FixedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<DraftReply, GeneratorError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(GeneratorError::new("model unavailable"));
        }
        Ok(DraftReply {
            text: "Hooks make this much cleaner".to_string(),
            voice_score: 0.9,
            quality_score: 0.8,
        })
    }
}

fn config() -> MonitorConfig {
    MonitorConfig::default()
        .with_tier_1_accounts(vec!["alpha".to_string(), "beta".to_string()])
        .with_tier_2_accounts(vec!["gamma".to_string()])
        .with_search_keywords(vec!["uniswap hooks".to_string()])
}

fn monitor(
    config: MonitorConfig,
    feed: Arc<ScriptedFeed>,
    admission: Arc<dyn AdmissionController>,
) -> AccountMonitor {
    let clock = Arc::new(ManualClock::new(at(NOW)));
    let evaluator = OpportunityEvaluator::new(&config, ProcessedContentSet::new(), clock);
    AccountMonitor::new(config, feed, admission, evaluator)
}

#[tokio::test]
async fn test_cycle_polls_tiers_then_searches() {
    let feed = Arc::new(
        ScriptedFeed::default()
            .timeline("alpha", Ok(vec![post("1", "alpha", "uniswap v4 is out")]))
            .timeline("gamma", Ok(vec![post("2", "gamma", "liquidity thread")]))
            .search(
                "uniswap hooks",
                Ok(vec![
                    post("3", "someone", "my first hooks contract"),
                    post("4", "someone", "lunch"),
                ]),
            ),
    );
    let admission = Arc::new(RecordingAdmission::default());
    let mut monitor = monitor(config(), feed.clone(), admission.clone());

    let report = monitor.run_cycle().await.unwrap();

    assert_eq!(
        feed.calls(),
        vec![
            Call::Timeline("alpha".to_string(), 10),
            Call::Timeline("beta".to_string(), 10),
            Call::Timeline("gamma".to_string(), 10),
            Call::Search("uniswap hooks".to_string(), 10),
        ]
    );
    let ids: Vec<&str> = report
        .opportunities
        .iter()
        .map(|o| o.content_id().as_str())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(report.accounts_checked, 3);
    assert_eq!(report.searches_run, 1);
    assert!(!report.rate_limited);
    assert_eq!(
        admission.events(),
        vec![
            "attempt user_timeline",
            "success user_timeline",
            "attempt user_timeline",
            "success user_timeline",
            "attempt user_timeline",
            "success user_timeline",
            "attempt search_tweets",
            "success search_tweets",
        ]
    );
}

#[tokio::test]
async fn test_rate_limit_ends_cycle_and_keeps_results() {
    let feed = Arc::new(
        ScriptedFeed::default()
            .timeline("alpha", Ok(vec![post("1", "alpha", "mev bots everywhere")]))
            .timeline(
                "beta",
                Err(FeedError::new(FeedErrorKind::RateLimited {
                    retry_after_secs: Some(900),
                })),
            ),
    );
    let admission = Arc::new(RecordingAdmission::default());
    let mut monitor = monitor(config(), feed.clone(), admission.clone());

    let report = monitor.run_cycle().await.unwrap();

    assert!(report.rate_limited);
    assert_eq!(report.opportunities.len(), 1);
    assert_eq!(feed.calls().len(), 2);
    assert_eq!(
        admission.events().last().map(String::as_str),
        Some("failure user_timeline Some(900)")
    );
}

#[tokio::test]
async fn test_denied_source_is_skipped() {
    let feed = Arc::new(
        ScriptedFeed::default().search("uniswap hooks", Ok(vec![post("5", "x", "hooks!")])),
    );
    let admission = Arc::new(RecordingAdmission {
        denied: vec![EndpointId::from("user_timeline")],
        ..Default::default()
    });
    let mut monitor = monitor(config(), feed.clone(), admission);

    let report = monitor.run_cycle().await.unwrap();

    assert_eq!(report.skipped.len(), 3);
    assert_eq!(report.skipped[0].source, "alpha");
    assert_eq!(
        report.skipped[0].reason,
        "Minimum delay not met: 60s remaining"
    );
    assert_eq!(report.accounts_checked, 0);
    assert_eq!(report.opportunities.len(), 1);
    assert_eq!(
        feed.calls(),
        vec![Call::Search("uniswap hooks".to_string(), 10)]
    );
}

#[tokio::test]
async fn test_missing_account_completes_the_call() {
    let feed = Arc::new(ScriptedFeed::default().timeline(
        "alpha",
        Err(FeedError::new(FeedErrorKind::NotFound("alpha".to_string()))),
    ));
    let admission = Arc::new(RecordingAdmission::default());
    let mut monitor = monitor(config(), feed.clone(), admission.clone());

    let report = monitor.run_cycle().await.unwrap();

    assert_eq!(report.failed, vec!["alpha".to_string()]);
    assert_eq!(feed.calls().len(), 4);
    assert_eq!(admission.events()[1], "success user_timeline");
}

#[tokio::test]
async fn test_transport_failure_backs_off_and_continues() {
    let feed = Arc::new(ScriptedFeed::default().timeline(
        "beta",
        Err(FeedError::new(FeedErrorKind::Request("connection reset".to_string()))),
    ));
    let admission = Arc::new(RecordingAdmission::default());
    let mut monitor = monitor(config(), feed.clone(), admission.clone());

    let report = monitor.run_cycle().await.unwrap();

    assert_eq!(report.failed, vec!["beta".to_string()]);
    assert!(!report.rate_limited);
    assert_eq!(admission.events()[3], "failure user_timeline None");
    assert_eq!(feed.calls().len(), 4);
}

#[tokio::test]
async fn test_timeline_items_without_author_belong_to_account() {
    let feed = Arc::new(
        ScriptedFeed::default().timeline("alpha", Ok(vec![post("1", "", "uniswap news")])),
    );
    let admission = Arc::new(RecordingAdmission::default());
    let mut monitor = monitor(config(), feed, admission);

    let report = monitor.run_cycle().await.unwrap();

    assert_eq!(report.opportunities[0].account(), "alpha");
    assert_eq!(*report.opportunities[0].tier(), AccountTier::Primary);
}

#[tokio::test]
async fn test_calendar_limiter_spaces_timeline_reads() {
    let clock = Arc::new(ManualClock::new(at(NOW)));
    let calendar = CalendarConfig::default().with_utc_offset_minutes(Some(0));
    let limiter = Arc::new(CalendarDayLimiter::new(calendar, clock.clone()).unwrap());
    let feed = Arc::new(
        ScriptedFeed::default().timeline("alpha", Ok(vec![post("1", "alpha", "hooks")])),
    );

    let config = config();
    let evaluator = OpportunityEvaluator::new(&config, ProcessedContentSet::new(), clock.clone());
    let mut monitor = AccountMonitor::new(config, feed.clone(), limiter.clone(), evaluator);

    let report = monitor.run_cycle().await.unwrap();

    // One timeline read, then the two hour minimum delay holds the others
    assert_eq!(report.accounts_checked, 1);
    assert_eq!(report.searches_run, 1);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(
        report.skipped[0].reason,
        "Minimum delay not met: 7200s remaining"
    );
    assert_eq!(
        limiter
            .phase(&EndpointId::from("user_timeline"))
            .unwrap(),
        EndpointPhase::Available
    );
    assert_eq!(
        limiter
            .remaining_quota(&EndpointId::from("user_timeline"))
            .unwrap(),
        7
    );
}

#[tokio::test]
async fn test_cancelled_cycle_abandons_the_attempt_in_flight() {
    let admission = Arc::new(RecordingAdmission::default());
    let config = config();
    let clock = Arc::new(ManualClock::new(at(NOW)));
    let evaluator = OpportunityEvaluator::new(&config, ProcessedContentSet::new(), clock);
    let mut monitor =
        AccountMonitor::new(config, Arc::new(SilentFeed), admission.clone(), evaluator);

    let outcome = tokio::time::timeout(Duration::from_millis(50), monitor.run_cycle()).await;

    assert!(outcome.is_err());
    assert_eq!(
        admission.events(),
        vec!["attempt user_timeline", "abandon user_timeline"]
    );
}

#[tokio::test]
async fn test_cancelled_cycle_leaves_calendar_endpoint_available() {
    let clock = Arc::new(ManualClock::new(at(NOW)));
    let calendar = CalendarConfig::default().with_utc_offset_minutes(Some(0));
    let limiter = Arc::new(CalendarDayLimiter::new(calendar, clock.clone()).unwrap());
    let timeline = EndpointId::from("user_timeline");

    let config = config();
    let evaluator = OpportunityEvaluator::new(&config, ProcessedContentSet::new(), clock.clone());
    let mut monitor =
        AccountMonitor::new(config, Arc::new(SilentFeed), limiter.clone(), evaluator);

    let outcome = tokio::time::timeout(Duration::from_millis(50), monitor.run_cycle()).await;
    assert!(outcome.is_err());

    // The call may have reached the server, so it stays counted
    assert_eq!(limiter.remaining_quota(&timeline).unwrap(), 7);
    assert_eq!(limiter.phase(&timeline).unwrap(), EndpointPhase::Available);
    assert!(limiter.can_admit(&timeline).unwrap().is_admitted());
}

#[tokio::test]
async fn test_unknown_endpoint_fails_the_cycle() {
    let clock = Arc::new(ManualClock::new(at(NOW)));
    let calendar = CalendarConfig::default().with_utc_offset_minutes(Some(0));
    let limiter = Arc::new(CalendarDayLimiter::new(calendar, clock.clone()).unwrap());

    let config = config().with_timeline_endpoint(EndpointId::from("timeline_v3"));
    let evaluator = OpportunityEvaluator::new(&config, ProcessedContentSet::new(), clock);
    let mut monitor = AccountMonitor::new(
        config,
        Arc::new(ScriptedFeed::default()),
        limiter,
        evaluator,
    );

    let err = monitor.run_cycle().await.unwrap_err();
    assert!(matches!(err.kind(), VigilErrorKind::Config(_)));
}

#[tokio::test]
async fn test_enrich_floors_tier_one_priority() {
    let feed = Arc::new(
        ScriptedFeed::default()
            .timeline("alpha", Ok(vec![post("1", "alpha", "uniswap")]))
            .timeline("gamma", Ok(vec![post("2", "gamma", "uniswap")])),
    );
    let mut monitor = monitor(config(), feed, Arc::new(RecordingAdmission::default()));
    let report = monitor.run_cycle().await.unwrap();
    let generator = FixedGenerator::new(false);

    let mut opportunities = report.opportunities.into_iter();
    let primary = opportunities.next().unwrap();
    let secondary = opportunities.next().unwrap();

    let enriched = monitor.enrich(&generator, primary).await.unwrap();
    assert!(*enriched.priority_score() >= 0.85);
    assert_eq!(enriched.draft().text, "Hooks make this much cleaner");

    let enriched = monitor.enrich(&generator, secondary).await.unwrap();
    assert!((*enriched.priority_score() - 0.7).abs() < 1e-9);

    let requests = generator.requests.lock().unwrap();
    assert_eq!(requests[0].author, "alpha");
    assert_eq!(requests[0].tier, AccountTier::Primary);
    assert_eq!(requests[0].context["is_strategic"], serde_json::json!(true));
    assert_eq!(requests[0].context["tier"], serde_json::json!(1));
    assert_eq!(requests[1].context["tier"], serde_json::json!(2));
}

#[tokio::test]
async fn test_enrich_reports_generator_failure() {
    let feed = Arc::new(
        ScriptedFeed::default().timeline("alpha", Ok(vec![post("1", "alpha", "uniswap")])),
    );
    let mut monitor = monitor(config(), feed, Arc::new(RecordingAdmission::default()));
    let report = monitor.run_cycle().await.unwrap();
    let opportunity = report.opportunities[0].clone();

    let err = monitor
        .enrich(&FixedGenerator::new(true), opportunity)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), VigilErrorKind::Generator(_)));
}
