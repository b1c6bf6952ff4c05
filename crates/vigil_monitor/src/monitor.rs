//! Monitoring cycle over strategic accounts and keyword searches.

use crate::{MonitorConfig, OpportunityEvaluator};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use vigil_core::{
    AccountTier, AccountTierMap, ContentItem, EndpointId, EnrichedOpportunity, FeedClient,
    GenerationRequest, OpportunityRecord, ReplyGenerator,
};
use vigil_error::{FeedError, VigilResult};
use vigil_rate_limit::AdmissionController;

/// What one monitoring cycle produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Accepted opportunities in discovery order
    pub opportunities: Vec<OpportunityRecord>,
    /// Timelines fetched
    pub accounts_checked: usize,
    /// Searches run
    pub searches_run: usize,
    /// Sources skipped because admission was denied, with the reason
    pub skipped: Vec<SkippedSource>,
    /// Sources whose call failed for a reason other than rate limiting
    pub failed: Vec<String>,
    /// True when the cycle ended early on a rate-limit refusal
    pub rate_limited: bool,
}

/// A source that was not polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    /// Account handle or search keyword
    pub source: String,
    /// Denial reason
    pub reason: String,
}

#[derive(Debug, Clone)]
enum Source {
    Timeline(String),
    Search(String),
}

impl Source {
    fn label(&self) -> &str {
        match self {
            Self::Timeline(account) => account,
            Self::Search(keyword) => keyword,
        }
    }
}

enum Step {
    Continue,
    Stop,
}

/// Abandons a recorded attempt when the fetch is dropped before its outcome
/// is reported.
struct InFlight {
    admission: Arc<dyn AdmissionController>,
    endpoint: EndpointId,
    settled: bool,
}

impl InFlight {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Err(e) = self.admission.abandon_attempt(&self.endpoint) {
            error!(endpoint = %self.endpoint, error = %e, "Failed to abandon attempt");
        }
    }
}

/// Polls strategic timelines and keyword searches through an admission
/// controller and evaluates what comes back.
pub struct AccountMonitor {
    config: MonitorConfig,
    tiers: AccountTierMap,
    feed: Arc<dyn FeedClient>,
    admission: Arc<dyn AdmissionController>,
    evaluator: OpportunityEvaluator,
}

impl std::fmt::Debug for AccountMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountMonitor")
            .field("tier_1_accounts", self.config.tier_1_accounts())
            .field("tier_2_accounts", self.config.tier_2_accounts())
            .field("search_keywords", self.config.search_keywords())
            .finish_non_exhaustive()
    }
}

impl AccountMonitor {
    /// Create a monitor.
    pub fn new(
        config: MonitorConfig,
        feed: Arc<dyn FeedClient>,
        admission: Arc<dyn AdmissionController>,
        evaluator: OpportunityEvaluator,
    ) -> Self {
        let tiers = config.tier_map();
        Self {
            config,
            tiers,
            feed,
            admission,
            evaluator,
        }
    }

    /// The evaluator, for operator actions on the processed set.
    pub fn evaluator_mut(&mut self) -> &mut OpportunityEvaluator {
        &mut self.evaluator
    }

    /// Tier map of the configured accounts.
    pub fn tiers(&self) -> &AccountTierMap {
        &self.tiers
    }

    /// Run one cycle: tier 1 timelines, tier 2 timelines, then searches.
    ///
    /// A denied source is skipped. A rate-limit refusal is reported to the
    /// admission controller and ends the cycle, keeping what was gathered.
    /// Dropping the future mid-call abandons the attempt in flight.
    ///
    /// # Errors
    ///
    /// Returns an error only when the admission controller fails, for
    /// example on an endpoint it does not know.
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self) -> VigilResult<CycleReport> {
        let sources: Vec<Source> = self
            .config
            .tier_1_accounts()
            .iter()
            .chain(self.config.tier_2_accounts())
            .cloned()
            .map(Source::Timeline)
            .chain(
                self.config
                    .search_keywords()
                    .iter()
                    .cloned()
                    .map(Source::Search),
            )
            .collect();

        info!(sources = sources.len(), "Starting monitoring cycle");
        let mut report = CycleReport::default();

        for source in sources {
            if let Step::Stop = self.poll(&source, &mut report).await? {
                break;
            }
        }

        info!(
            opportunities = report.opportunities.len(),
            accounts_checked = report.accounts_checked,
            searches_run = report.searches_run,
            skipped = report.skipped.len(),
            rate_limited = report.rate_limited,
            "Monitoring cycle finished"
        );
        Ok(report)
    }

    async fn poll(&mut self, source: &Source, report: &mut CycleReport) -> VigilResult<Step> {
        let endpoint = match source {
            Source::Timeline(_) => self.config.timeline_endpoint().clone(),
            Source::Search(_) => self.config.search_endpoint().clone(),
        };

        let admission = self.admission.can_admit(&endpoint)?;
        if !admission.is_admitted() {
            warn!(source = source.label(), reason = %admission, "Admission denied, skipping");
            report.skipped.push(SkippedSource {
                source: source.label().to_string(),
                reason: admission.to_string(),
            });
            return Ok(Step::Continue);
        }

        self.admission.record_attempt(&endpoint)?;
        let in_flight = InFlight {
            admission: self.admission.clone(),
            endpoint: endpoint.clone(),
            settled: false,
        };
        let result = match source {
            Source::Timeline(account) => {
                report.accounts_checked += 1;
                self.feed
                    .user_timeline(account, *self.config.timeline_page_size())
                    .await
                    .map(|items| attribute(items, account))
            }
            Source::Search(keyword) => {
                report.searches_run += 1;
                self.feed
                    .search(keyword, *self.config.search_page_size())
                    .await
            }
        };
        in_flight.settle();

        match result {
            Ok(items) => {
                self.admission.record_success(&endpoint)?;
                debug!(source = source.label(), items = items.len(), "Fetched items");
                let accepted = self.evaluator.evaluate(&items, &self.tiers);
                report.opportunities.extend(accepted);
                Ok(Step::Continue)
            }
            Err(e) if e.is_rate_limit() => {
                self.admission.record_failure(&endpoint, e.retry_after())?;
                warn!(source = source.label(), error = %e, "Rate limited, ending cycle early");
                report.rate_limited = true;
                Ok(Step::Stop)
            }
            Err(e) => {
                self.settle_failure(&endpoint, &e)?;
                error!(source = source.label(), error = %e, "Failed to poll source");
                report.failed.push(source.label().to_string());
                Ok(Step::Continue)
            }
        }
    }

    /// A missing resource completes the call; other failures back off.
    fn settle_failure(&self, endpoint: &EndpointId, error: &FeedError) -> VigilResult<()> {
        if error.is_retryable() {
            self.admission.record_failure(endpoint, error.retry_after())
        } else {
            self.admission.record_success(endpoint)
        }
    }

    /// Ask `generator` for a draft reply to `opportunity`.
    ///
    /// # Errors
    ///
    /// Returns the generator's error; the opportunity itself is unaffected.
    #[instrument(skip(self, generator, opportunity), fields(content_id = %opportunity.content_id()))]
    pub async fn enrich(
        &self,
        generator: &dyn ReplyGenerator,
        opportunity: OpportunityRecord,
    ) -> VigilResult<EnrichedOpportunity> {
        let request = generation_request(&opportunity);
        let draft = generator.generate(&request).await.map_err(|e| {
            error!(error = %e, "Failed to draft reply");
            e
        })?;
        let enriched = EnrichedOpportunity::new(opportunity, draft);
        debug!(priority_score = enriched.priority_score(), "Enriched opportunity");
        Ok(enriched)
    }
}

/// Timeline items without an author belong to the polled account.
fn attribute(mut items: Vec<ContentItem>, account: &str) -> Vec<ContentItem> {
    for item in items.iter_mut().filter(|item| item.author.is_empty()) {
        item.author = account.to_string();
    }
    items
}

fn generation_request(opportunity: &OpportunityRecord) -> GenerationRequest {
    let tier: AccountTier = *opportunity.tier();
    let context = BTreeMap::from([
        ("is_strategic".to_string(), json!(opportunity.is_strategic())),
        ("tier".to_string(), json!(tier.number())),
        (
            "relevance_score".to_string(),
            json!(opportunity.relevance_score()),
        ),
    ]);
    GenerationRequest {
        text: opportunity.text().clone(),
        author: opportunity.account().clone(),
        tier,
        context,
    }
}
