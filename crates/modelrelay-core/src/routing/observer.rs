//! Routing event sinks

use tracing::{info, warn};

use super::types::{AttemptOutcome, RoutingEvent};

/// Receives one event per dispatch attempt
pub trait RoutingObserver: Send + Sync {
    fn on_attempt(&self, event: &RoutingEvent);
}

impl<F> RoutingObserver for F
where
    F: Fn(&RoutingEvent) + Send + Sync,
{
    fn on_attempt(&self, event: &RoutingEvent) {
        self(event)
    }
}

/// Logs every attempt through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RoutingObserver for TracingObserver {
    fn on_attempt(&self, event: &RoutingEvent) {
        match event.outcome {
            AttemptOutcome::Success => info!(
                request_id = %event.request_id,
                requested = %event.requested_model,
                model = %event.model_id,
                tier = %event.tier,
                attempt = event.attempt,
                substituted = event.was_substituted,
                "Routing attempt succeeded"
            ),
            outcome => warn!(
                request_id = %event.request_id,
                requested = %event.requested_model,
                model = %event.model_id,
                tier = %event.tier,
                attempt = event.attempt,
                substituted = event.was_substituted,
                outcome = %outcome,
                error = event.error.as_deref().unwrap_or(""),
                "Routing attempt did not succeed"
            ),
        }
    }
}
