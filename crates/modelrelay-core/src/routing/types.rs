//! Types shared by the selector, dispatcher, and observers

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{ModelDescriptor, Tier};
use crate::llm::LlmResponse;

/// Model picked by the fallback selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen model
    pub model: Arc<ModelDescriptor>,
    /// True when the chosen model differs from the one asked for
    pub was_substituted: bool,
}

impl Selection {
    pub fn model_id(&self) -> &str {
        &self.model.id
    }

    pub fn tier(&self) -> Tier {
        self.model.tier
    }
}

/// How one dispatch attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// Rate-limit signal; the model was disabled and a substitute may follow
    RateLimited,
    /// Any other transport failure; surfaced to the caller
    Failed,
    /// Caller cancelled while the attempt was in flight
    Cancelled,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Record of one attempt within a dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Model the attempt targeted
    pub model_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// Whether the model differs from the requested one
    pub was_substituted: bool,
    pub outcome: AttemptOutcome,
}

/// Observability event emitted once per attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingEvent {
    /// Shared by every attempt of one dispatch
    pub request_id: Uuid,
    /// Model id as the caller gave it
    pub requested_model: String,
    pub model_id: String,
    pub tier: Tier,
    pub attempt: u32,
    pub was_substituted: bool,
    pub outcome: AttemptOutcome,
    /// Failure message, when the attempt failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RoutingEvent {
    /// Decision trail entry for this event
    pub fn decision(&self) -> RoutingDecision {
        RoutingDecision {
            model_id: self.model_id.clone(),
            attempt: self.attempt,
            was_substituted: self.was_substituted,
            outcome: self.outcome,
        }
    }
}

/// Result of a successful dispatch
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub request_id: Uuid,
    /// Model id as the caller gave it
    pub requested_model: String,
    /// Generation from the model that served the request
    pub response: LlmResponse,
    /// Every attempt in order; the last one succeeded
    pub decisions: Vec<RoutingDecision>,
}

impl DispatchOutcome {
    /// The successful attempt
    pub fn final_decision(&self) -> Option<&RoutingDecision> {
        self.decisions.last()
    }

    /// Model that produced the response
    pub fn served_by(&self) -> Option<&str> {
        self.final_decision().map(|d| d.model_id.as_str())
    }

    pub fn was_substituted(&self) -> bool {
        self.final_decision().is_some_and(|d| d.was_substituted)
    }

    pub fn attempts(&self) -> u32 {
        self.decisions.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_outcome_accessors() {
        let outcome = DispatchOutcome {
            request_id: Uuid::new_v4(),
            requested_model: "a".to_string(),
            response: LlmResponse::text("b", "hi"),
            decisions: vec![
                RoutingDecision {
                    model_id: "a".to_string(),
                    attempt: 1,
                    was_substituted: false,
                    outcome: AttemptOutcome::RateLimited,
                },
                RoutingDecision {
                    model_id: "b".to_string(),
                    attempt: 2,
                    was_substituted: true,
                    outcome: AttemptOutcome::Success,
                },
            ],
        };

        assert_eq!(outcome.attempts(), 2);
        assert_eq!(outcome.served_by(), Some("b"));
        assert!(outcome.was_substituted());
    }

    #[test]
    fn test_event_serializes_outcome_snake_case() {
        let event = RoutingEvent {
            request_id: Uuid::nil(),
            requested_model: "github/a".to_string(),
            model_id: "a".to_string(),
            tier: Tier::High,
            attempt: 1,
            was_substituted: false,
            outcome: AttemptOutcome::RateLimited,
            error: None,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["outcome"], "rate_limited");
        assert_eq!(json["tier"], "high");
        assert!(json.get("error").is_none());
        assert_eq!(event.decision().outcome, AttemptOutcome::RateLimited);
    }
}
