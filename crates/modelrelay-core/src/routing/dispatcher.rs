//! Resilient Dispatcher - rate-limit aware completion routing
//!
//! Runs one generation for a requested model. When the backend signals a rate
//! limit, the model is disabled in the shared tracker and the request moves to
//! a same-tier substitute, up to a fixed number of attempts. Any other failure
//! is returned to the caller immediately as [`Error::Upstream`], unchanged; the
//! models tried before it are reported through [`RoutingObserver`] events,
//! which share the request id.
//!
//! The caller's requested model is never rewritten: a substitute serves one
//! request only, and the next request starts from the requested model again.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::observer::{RoutingObserver, TracingObserver};
use super::selector::FallbackSelector;
use super::types::{AttemptOutcome, DispatchOutcome, RoutingDecision, RoutingEvent, Selection};
use crate::availability::AvailabilityTracker;
use crate::catalog::{CatalogSnapshot, CatalogStore, ModelDescriptor};
use crate::error::{Error, Result};
use crate::llm::{ChatRequest, CompletionTransport};

/// Default attempt budget per request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Per-request bookkeeping
struct Attempts<'a> {
    request_id: Uuid,
    requested: &'a str,
    requested_model: Arc<ModelDescriptor>,
    /// Models attempted so far, in order, starting with the requested model
    tried: Vec<String>,
    decisions: Vec<RoutingDecision>,
    count: u32,
}

impl<'a> Attempts<'a> {
    fn new(requested: &'a str, requested_model: Arc<ModelDescriptor>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            requested,
            tried: vec![requested_model.id.clone()],
            requested_model,
            decisions: Vec::new(),
            count: 0,
        }
    }

    fn begin(&mut self, model_id: &str) -> u32 {
        if !self.tried.iter().any(|id| id == model_id) {
            self.tried.push(model_id.to_string());
        }
        self.count += 1;
        self.count
    }

    fn exhausted(self, last_error: Error) -> Error {
        Error::Exhausted {
            requested: self.requested.to_string(),
            tier: self.requested_model.tier,
            attempted: self.tried,
            attempts: self.count,
            last_error: Box::new(last_error),
        }
    }
}

/// Routes completions with same-tier fallback on rate limits
pub struct ResilientDispatcher {
    catalog: Arc<CatalogStore>,
    tracker: Arc<AvailabilityTracker>,
    transport: Arc<dyn CompletionTransport>,
    observer: Arc<dyn RoutingObserver>,
    selector: FallbackSelector,
    max_attempts: u32,
}

impl std::fmt::Debug for ResilientDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientDispatcher")
            .field("catalog", &self.catalog)
            .field("tracker", &self.tracker.stats())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl ResilientDispatcher {
    /// Create a dispatcher with the default attempt budget and tracing observer
    pub fn new(
        catalog: Arc<CatalogStore>,
        tracker: Arc<AvailabilityTracker>,
        transport: Arc<dyn CompletionTransport>,
    ) -> Self {
        Self {
            catalog,
            tracker,
            transport,
            observer: Arc::new(TracingObserver),
            selector: FallbackSelector::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Create a builder
    pub fn builder() -> ResilientDispatcherBuilder {
        ResilientDispatcherBuilder::default()
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn tracker(&self) -> &Arc<AvailabilityTracker> {
        &self.tracker
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run one generation for `requested`, falling back within its tier on rate limits
    pub async fn route_and_complete(
        &self,
        requested: &str,
        request: &ChatRequest,
    ) -> Result<DispatchOutcome> {
        self.route_and_complete_with_cancel(requested, request, &CancellationToken::new())
            .await
    }

    /// As [`Self::route_and_complete`], abandoning the request when `cancel` fires
    ///
    /// Cancellation during an attempt records nothing in the tracker.
    pub async fn route_and_complete_with_cancel(
        &self,
        requested: &str,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let catalog = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            snapshot = self.catalog.get() => snapshot?,
        };

        let requested_model = catalog
            .get(requested)
            .cloned()
            .ok_or_else(|| Error::UnknownModel(requested.to_string()))?;

        let mut attempts = Attempts::new(requested, requested_model.clone());

        debug!(
            request_id = %attempts.request_id,
            requested = %requested,
            model = %requested_model.id,
            tier = %requested_model.tier,
            max_attempts = self.max_attempts,
            "Dispatching request"
        );

        let mut selection =
            match self
                .selector
                .select(&requested_model.id, &catalog, &self.tracker, &[])
            {
                Ok(selection) => selection,
                Err(e @ Error::TierExhausted { .. }) => return Err(attempts.exhausted(e)),
                Err(e) => return Err(e),
            };

        loop {
            let model_id = selection.model_id().to_string();
            let attempt = attempts.begin(&model_id);
            let was_substituted = model_id != requested_model.id;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.emit(&attempts, &selection, attempt, AttemptOutcome::Cancelled, None);
                    info!(
                        request_id = %attempts.request_id,
                        model = %model_id,
                        attempt,
                        "Request cancelled during attempt"
                    );
                    return Err(Error::Cancelled);
                }
                result = self.transport.complete(&model_id, request) => result,
            };

            match result {
                Ok(response) => {
                    let event =
                        self.emit(&attempts, &selection, attempt, AttemptOutcome::Success, None);
                    attempts.decisions.push(event.decision());

                    if was_substituted {
                        info!(
                            request_id = %attempts.request_id,
                            requested = %requested_model.id,
                            served_by = %model_id,
                            attempts = attempt,
                            "Request served by substitute model"
                        );
                    }

                    return Ok(DispatchOutcome {
                        request_id: attempts.request_id,
                        requested_model: requested.to_string(),
                        response,
                        decisions: attempts.decisions,
                    });
                }
                Err(e) if e.is_rate_limited() => {
                    self.tracker.disable(&model_id);
                    let event = self.emit(
                        &attempts,
                        &selection,
                        attempt,
                        AttemptOutcome::RateLimited,
                        Some(e.to_string()),
                    );
                    attempts.decisions.push(event.decision());

                    if attempts.count >= self.max_attempts {
                        warn!(
                            request_id = %attempts.request_id,
                            requested = %requested_model.id,
                            attempts = attempts.count,
                            "Attempt budget spent"
                        );
                        return Err(attempts.exhausted(Error::Upstream(e)));
                    }

                    selection = match self.next_selection(&model_id, &catalog, &attempts.tried) {
                        Some(next) => next,
                        None => return Err(attempts.exhausted(Error::Upstream(e))),
                    };
                }
                Err(e) => {
                    self.emit(
                        &attempts,
                        &selection,
                        attempt,
                        AttemptOutcome::Failed,
                        Some(e.to_string()),
                    );
                    return Err(Error::Upstream(e));
                }
            }
        }
    }

    /// Substitute for a model that just rate limited, or `None` when the tier has
    /// nothing left that has not already been attempted
    fn next_selection(
        &self,
        failed: &str,
        catalog: &CatalogSnapshot,
        tried: &[String],
    ) -> Option<Selection> {
        match self.selector.substitute(failed, catalog, &self.tracker, tried) {
            Ok(next) => Some(next),
            Err(e) => {
                debug!(error = %e, "No untried substitute available");
                None
            }
        }
    }

    fn emit(
        &self,
        attempts: &Attempts<'_>,
        selection: &Selection,
        attempt: u32,
        outcome: AttemptOutcome,
        error: Option<String>,
    ) -> RoutingEvent {
        let event = RoutingEvent {
            request_id: attempts.request_id,
            requested_model: attempts.requested.to_string(),
            model_id: selection.model_id().to_string(),
            tier: selection.tier(),
            attempt,
            was_substituted: selection.model.id != attempts.requested_model.id,
            outcome,
            error,
            timestamp: Utc::now(),
        };
        self.observer.on_attempt(&event);
        event
    }
}

/// Builder for [`ResilientDispatcher`]
#[derive(Default)]
pub struct ResilientDispatcherBuilder {
    catalog: Option<Arc<CatalogStore>>,
    tracker: Option<Arc<AvailabilityTracker>>,
    transport: Option<Arc<dyn CompletionTransport>>,
    observer: Option<Arc<dyn RoutingObserver>>,
    max_attempts: Option<u32>,
}

impl ResilientDispatcherBuilder {
    pub fn catalog(mut self, catalog: Arc<CatalogStore>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Shared tracker; defaults to a fresh one with the system clock
    pub fn tracker(mut self, tracker: Arc<AvailabilityTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn CompletionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Event sink; defaults to [`TracingObserver`]
    pub fn observer(mut self, observer: Arc<dyn RoutingObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn build(self) -> Result<ResilientDispatcher> {
        let catalog = self
            .catalog
            .ok_or_else(|| Error::ConfigError("dispatcher requires a catalog store".to_string()))?;
        let transport = self.transport.ok_or_else(|| {
            Error::ConfigError("dispatcher requires a completion transport".to_string())
        })?;
        let max_attempts = self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(Error::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(ResilientDispatcher {
            catalog,
            tracker: self.tracker.unwrap_or_default(),
            transport,
            observer: self.observer.unwrap_or_else(|| Arc::new(TracingObserver)),
            selector: FallbackSelector::new(),
            max_attempts,
        })
    }
}
