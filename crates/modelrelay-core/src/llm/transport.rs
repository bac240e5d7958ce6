//! Collaborator interfaces consumed by the routing core
//!
//! The core never talks to the network itself. It lists models through a
//! [`ModelLister`] and performs generations through a [`CompletionTransport`];
//! [`super::AggregatorClient`] implements both over HTTP.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{ChatRequest, LlmResponse};

/// Classification of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The upstream throttled this model; switching models may help
    RateLimited,
    /// Credentials rejected
    Unauthorized,
    /// The request itself is malformed
    InvalidRequest,
    /// Model or endpoint does not exist upstream
    NotFound,
    /// Connection, DNS, or timeout failure
    Network,
    /// Upstream 5xx
    Server,
    /// Anything else
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::InvalidRequest => write!(f, "invalid request"),
            Self::NotFound => write!(f, "not found"),
            Self::Network => write!(f, "network"),
            Self::Server => write!(f, "server error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Error returned by a transport collaborator
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} error from '{model}': {message}")]
pub struct TransportError {
    /// Model the failing call targeted (empty for catalog calls)
    pub model: String,
    /// Failure classification
    pub kind: TransportErrorKind,
    /// Upstream message
    pub message: String,
    /// Retry hint supplied by the upstream, if any
    pub retry_after: Option<Duration>,
}

impl TransportError {
    /// Create a new transport error
    pub fn new(
        model: impl Into<String>,
        kind: TransportErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Shorthand for a rate-limit failure
    pub fn rate_limited(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(model, TransportErrorKind::RateLimited, message)
    }

    /// Attach a retry hint
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Whether this failure is a rate-limit signal
    pub fn is_rate_limited(&self) -> bool {
        self.kind == TransportErrorKind::RateLimited
    }
}

/// One entry of the upstream model listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedModel {
    /// Model identifier, usually `<publisher>/<model>`
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Publisher / provider namespace
    #[serde(default, alias = "publisher")]
    pub provider: Option<String>,
    /// Capability tags
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Tier hint supplied by the upstream catalog
    #[serde(default)]
    pub rate_limit_tier: Option<String>,
}

impl ListedModel {
    /// Create a listing entry with just an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            provider: None,
            capabilities: BTreeSet::new(),
            rate_limit_tier: None,
        }
    }

    /// Set the tier hint
    pub fn with_tier_hint(mut self, tier: impl Into<String>) -> Self {
        self.rate_limit_tier = Some(tier.into());
        self
    }

    /// Set capability tags
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Provider namespace, falling back to the id prefix before `/`
    pub fn resolved_provider(&self) -> String {
        match &self.provider {
            Some(provider) if !provider.is_empty() => provider.to_lowercase(),
            _ => self
                .id
                .split_once('/')
                .map(|(provider, _)| provider.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Upstream model-listing service
#[async_trait]
pub trait ModelLister: Send + Sync {
    /// Fetch the full model listing
    async fn list_models(&self) -> Result<Vec<ListedModel>, TransportError>;
}

/// Upstream completion service
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Run one generation against one model
    async fn complete(
        &self,
        model_id: &str,
        request: &ChatRequest,
    ) -> Result<LlmResponse, TransportError>;
}
