//! Explicitly constructed application state.

use crate::VigilConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use vigil_cache::RequestCache;
use vigil_core::{Clock, EndpointId, FeedClient};
use vigil_error::VigilResult;
use vigil_monitor::{AccountMonitor, OpportunityEvaluator, ProcessedContentSet};
use vigil_rate_limit::{
    Admission, AdmissionController, CalendarDayLimiter, EndpointUsage, FreeTierStatus,
    PostingOutlook, RequestDispatcher, RollingWindowLimiter, SearchStrategy,
};
use vigil_storage::DataLayout;

/// Admission verdicts of both controllers for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointCheck {
    /// Endpoint checked
    pub endpoint: EndpointId,
    /// Calendar-day verdict; `None` when the endpoint has no daily quota
    pub calendar: Option<Admission>,
    /// Calls left today
    pub calendar_remaining: Option<u32>,
    /// Rolling-window verdict
    pub rolling: Admission,
    /// Calls left in the current window
    pub rolling_remaining: u32,
}

/// Everything `vigil status` reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Calendar-day usage
    pub free_tier: FreeTierStatus,
    /// Whether a keyword search may run now
    pub search_strategy: SearchStrategy,
    /// Rolling-window usage per endpoint
    pub usage: Vec<EndpointUsage>,
    /// Write planning figures
    pub outlook: PostingOutlook,
}

/// Limiters, cache and stores opened from one configuration.
///
/// Built once at startup and passed by reference; nothing in Vigil is a
/// process-wide singleton.
#[derive(Debug)]
pub struct VigilContext {
    config: VigilConfig,
    layout: DataLayout,
    clock: Arc<dyn Clock>,
    calendar: Arc<CalendarDayLimiter>,
    dispatcher: Arc<RequestDispatcher>,
}

impl VigilContext {
    /// Open every persisted store under the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a limiter configuration is invalid.
    #[instrument(skip(config, clock), fields(data_dir = %config.data_dir().display()))]
    pub fn open(config: VigilConfig, clock: Arc<dyn Clock>) -> VigilResult<Self> {
        let layout = config.layout();

        let calendar = CalendarDayLimiter::open(
            config.calendar().clone(),
            clock.clone(),
            layout.free_tier_limits(),
        )?;
        let rolling = RollingWindowLimiter::open(
            config.rolling().clone(),
            clock.clone(),
            layout.rolling_state(),
        )?;
        let cache = RequestCache::open(config.cache().clone(), layout.request_cache(), clock.now());

        info!("Vigil context ready");
        Ok(Self {
            config,
            layout,
            clock,
            calendar: Arc::new(calendar),
            dispatcher: Arc::new(RequestDispatcher::new(Arc::new(rolling), cache)),
        })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Locations of the persisted documents.
    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Shared clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Calendar-day controller.
    pub fn calendar(&self) -> &Arc<CalendarDayLimiter> {
        &self.calendar
    }

    /// Rolling-window controller.
    pub fn rolling(&self) -> &Arc<RollingWindowLimiter> {
        self.dispatcher.limiter()
    }

    /// Cached, queued request path over the rolling-window controller.
    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    /// Evaluator over the persisted processed-content set.
    ///
    /// Each call reads the set from disk; keep a single evaluator alive at a
    /// time so writes do not race.
    pub fn open_evaluator(&self) -> OpportunityEvaluator {
        let processed = ProcessedContentSet::open(self.layout.processed_content());
        OpportunityEvaluator::new(self.config.monitor(), processed, self.clock.clone())
    }

    /// Monitor polling `feed` under the calendar-day controller.
    pub fn account_monitor(&self, feed: Arc<dyn FeedClient>) -> AccountMonitor {
        let admission: Arc<dyn AdmissionController> = self.calendar.clone();
        AccountMonitor::new(
            self.config.monitor().clone(),
            feed,
            admission,
            self.open_evaluator(),
        )
    }

    /// Ask both controllers about `endpoint` without recording anything.
    ///
    /// # Errors
    ///
    /// Returns an error if a controller fails to read its state.
    pub fn check(&self, endpoint: &EndpointId) -> VigilResult<EndpointCheck> {
        let (calendar, calendar_remaining) =
            if self.calendar.config().endpoints().contains_key(endpoint) {
                (
                    Some(self.calendar.can_admit(endpoint)?),
                    Some(self.calendar.remaining_quota(endpoint)?),
                )
            } else {
                (None, None)
            };

        let rolling = self.rolling();
        Ok(EndpointCheck {
            endpoint: endpoint.clone(),
            calendar,
            calendar_remaining,
            rolling: rolling.can_admit(endpoint)?,
            rolling_remaining: rolling.remaining_quota(endpoint)?,
        })
    }

    /// Usage of both controllers and the posting outlook.
    ///
    /// # Errors
    ///
    /// Returns an error if the search or post endpoint is not configured.
    pub fn status(&self) -> VigilResult<StatusReport> {
        Ok(StatusReport {
            free_tier: self.calendar.status_summary(),
            search_strategy: self.calendar.search_strategy()?,
            usage: self.rolling().usage_analytics(),
            outlook: self.dispatcher.posting_outlook()?,
        })
    }

    /// Persist the request cache.
    ///
    /// Limiter documents are written on every change and need no flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache document cannot be written.
    pub fn flush(&self) -> VigilResult<()> {
        self.dispatcher.cleanup_cache();
        self.dispatcher.flush_cache()
    }
}
