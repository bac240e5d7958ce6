//! Assembly of the routing stack from configuration

use std::sync::Arc;

use crate::availability::AvailabilityTracker;
use crate::catalog::{CatalogStore, TierRules};
use crate::clock::{Clock, SystemClock};
use crate::config::RelayConfig;
use crate::credentials::CredentialProvider;
use crate::error::{Error, Result};
use crate::llm::{AggregatorClient, ChatRequest, CompletionTransport, ModelLister};
use crate::routing::{DispatchOutcome, ResilientDispatcher, RoutingObserver, TracingObserver};

/// Catalog, tracker, and dispatcher sharing one configuration
#[derive(Debug)]
pub struct ModelRelay {
    catalog: Arc<CatalogStore>,
    tracker: Arc<AvailabilityTracker>,
    dispatcher: ResilientDispatcher,
}

impl ModelRelay {
    /// Build against the configured aggregator
    pub fn from_config(
        config: &RelayConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let client = Arc::new(AggregatorClient::new(config.upstream.clone(), credentials)?);
        Self::with_collaborators(
            config,
            client.clone(),
            client,
            Arc::new(SystemClock),
            Arc::new(TracingObserver),
        )
    }

    /// Build with explicit collaborators
    pub fn with_collaborators(
        config: &RelayConfig,
        lister: Arc<dyn ModelLister>,
        transport: Arc<dyn CompletionTransport>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn RoutingObserver>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::ConfigError(format!("{:#}", e)))?;

        let catalog = Arc::new(
            CatalogStore::builder(lister)
                .clock(clock.clone())
                .rules(TierRules::from_config(&config.catalog.tier_rules)?)
                .ttl(config.catalog.ttl())
                .model_prefix(config.upstream.model_prefix.clone())
                .build(),
        );
        let tracker = Arc::new(AvailabilityTracker::new(
            clock,
            config.availability.cooldown(),
        ));
        let dispatcher = ResilientDispatcher::builder()
            .catalog(catalog.clone())
            .tracker(tracker.clone())
            .transport(transport)
            .observer(observer)
            .max_attempts(config.dispatch.max_attempts)
            .build()?;

        Ok(Self {
            catalog,
            tracker,
            dispatcher,
        })
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn tracker(&self) -> &Arc<AvailabilityTracker> {
        &self.tracker
    }

    pub fn dispatcher(&self) -> &ResilientDispatcher {
        &self.dispatcher
    }

    /// Run one routed completion
    pub async fn complete(&self, requested: &str, request: &ChatRequest) -> Result<DispatchOutcome> {
        self.dispatcher.route_and_complete(requested, request).await
    }
}
