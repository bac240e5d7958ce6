//! Aggregator HTTP client implementation
//!
//! Provides the reference transport for the routing core:
//! - Model listing from the aggregator catalog endpoint
//! - Chat completions against a single model per call
//! - Classification of failures into rate-limit vs everything else
//!
//! The client never retries or substitutes models; the dispatcher owns that loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::UpstreamConfig;
use crate::credentials::CredentialProvider;
use crate::error::{Error, Result};

use super::transport::{
    CompletionTransport, ListedModel, ModelLister, TransportError, TransportErrorKind,
};
use super::types::{ChatRequest, ChatRequestBody, ChatResponse, LlmResponse};

/// GitHub Models base URL
pub const DEFAULT_BASE_URL: &str = "https://models.github.ai";

/// Media type requested from the catalog endpoint
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Header carrying the pinned API version
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";

/// Upstream error code used alongside (or instead of) HTTP 429
const RATE_LIMIT_ERROR_CODE: &str = "RateLimitReached";

/// HTTP client for the upstream model aggregator
#[derive(Clone)]
pub struct AggregatorClient {
    /// HTTP client for making requests
    http_client: HttpClient,
    /// Base URL for the API
    base_url: String,
    /// Path of the model listing endpoint
    catalog_path: String,
    /// Path of the chat completions endpoint
    completions_path: String,
    /// Pinned API version sent with every call
    api_version: String,
    /// Token source, consulted per call
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for AggregatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorClient")
            .field("base_url", &self.base_url)
            .field("catalog_path", &self.catalog_path)
            .field("completions_path", &self.completions_path)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Builder for creating an AggregatorClient
pub struct AggregatorClientBuilder {
    upstream: UpstreamConfig,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl Default for AggregatorClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatorClientBuilder {
    /// Create a new builder with default upstream settings
    pub fn new() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            credentials: None,
        }
    }

    /// Use the given upstream configuration
    pub fn upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.upstream = upstream;
        self
    }

    /// Set the credential provider
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the base URL (defaults to GitHub Models)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.upstream.base_url = url.into();
        self
    }

    /// Set the request timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.upstream.timeout_secs = secs;
        self
    }

    /// Build the AggregatorClient
    pub fn build(self) -> Result<AggregatorClient> {
        let credentials = self.credentials.ok_or(Error::CredentialsMissing)?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(self.upstream.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(AggregatorClient {
            http_client,
            base_url: self.upstream.base_url.trim_end_matches('/').to_string(),
            catalog_path: self.upstream.catalog_path,
            completions_path: self.upstream.completions_path,
            api_version: self.upstream.api_version,
            credentials,
        })
    }
}

/// Catalog payloads come either as a bare array or wrapped in `data`
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogPayload {
    Bare(Vec<ListedModel>),
    Wrapped { data: Vec<ListedModel> },
}

impl AggregatorClient {
    /// Create a client from upstream configuration
    pub fn new(upstream: UpstreamConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        AggregatorClientBuilder::new()
            .upstream(upstream)
            .credentials(credentials)
            .build()
    }

    /// Create a new builder for AggregatorClient
    pub fn builder() -> AggregatorClientBuilder {
        AggregatorClientBuilder::new()
    }

    /// Base URL the client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer_token(&self, model: &str) -> std::result::Result<Zeroizing<String>, TransportError> {
        self.credentials
            .token()
            .map_err(|e| TransportError::new(model, TransportErrorKind::Unauthorized, e.to_string()))
    }

    /// Fetch the model catalog
    async fn fetch_models(&self) -> std::result::Result<Vec<ListedModel>, TransportError> {
        let url = self.url(&self.catalog_path);
        debug!(url = %url, "Fetching model catalog");

        let token = self.bearer_token("")?;
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token.as_str())
            .header(ACCEPT, GITHUB_ACCEPT)
            .header(API_VERSION_HEADER, &self.api_version)
            .send()
            .await
            .map_err(|e| network_error("", &e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_response("", status, &headers, &body));
        }

        let payload: CatalogPayload = response.json().await.map_err(|e| {
            TransportError::new(
                "",
                TransportErrorKind::Other,
                format!("Failed to parse catalog: {}", e),
            )
        })?;

        let models = match payload {
            CatalogPayload::Bare(models) | CatalogPayload::Wrapped { data: models } => models,
        };
        debug!(count = models.len(), "Fetched model catalog");
        Ok(models)
    }

    /// Send a single completion request
    async fn send_completion(
        &self,
        model: &str,
        request: &ChatRequest,
    ) -> std::result::Result<LlmResponse, TransportError> {
        let url = self.url(&self.completions_path);

        debug!(
            model = %model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let token = self.bearer_token(model)?;
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.as_str())
            .header(API_VERSION_HEADER, &self.api_version)
            .json(&ChatRequestBody { model, request })
            .send()
            .await
            .map_err(|e| network_error(model, &e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_response(model, status, &headers, &body));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            TransportError::new(
                model,
                TransportErrorKind::Other,
                format!("Failed to parse response: {}", e),
            )
        })?;

        LlmResponse::from_chat_response(chat_response, model).ok_or_else(|| {
            TransportError::new(model, TransportErrorKind::Other, "Empty response from API")
        })
    }
}

#[async_trait]
impl ModelLister for AggregatorClient {
    async fn list_models(&self) -> std::result::Result<Vec<ListedModel>, TransportError> {
        self.fetch_models().await
    }
}

#[async_trait]
impl CompletionTransport for AggregatorClient {
    async fn complete(
        &self,
        model_id: &str,
        request: &ChatRequest,
    ) -> std::result::Result<LlmResponse, TransportError> {
        self.send_completion(model_id, request).await
    }
}

fn network_error(model: &str, error: &reqwest::Error) -> TransportError {
    TransportError::new(model, TransportErrorKind::Network, error.to_string())
}

/// Map a non-success response onto a transport error
fn classify_response(
    model: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> TransportError {
    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .or_else(|| extract_retry_after(body))
        .map(Duration::from_secs);

    let kind = if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limit_body(body) {
        TransportErrorKind::RateLimited
    } else {
        match status.as_u16() {
            401 | 403 => TransportErrorKind::Unauthorized,
            400 | 413 | 422 => TransportErrorKind::InvalidRequest,
            404 => TransportErrorKind::NotFound,
            500..=599 => TransportErrorKind::Server,
            _ => TransportErrorKind::Other,
        }
    };

    let message = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    };

    let mut error = TransportError::new(model, kind, message);
    error.retry_after = retry_after;
    error
}

/// Whether the error body carries the upstream rate-limit code
fn is_rate_limit_body(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("code"))
                .and_then(|c| c.as_str())
                .map(|code| code == RATE_LIMIT_ERROR_CODE)
        })
        .unwrap_or(false)
}

/// Extract retry-after value from error response
fn extract_retry_after(body: &str) -> Option<u64> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(retry_after) = json.get("retry_after").and_then(|v| v.as_u64()) {
            return Some(retry_after);
        }
        if let Some(error) = json.get("error")
            && let Some(retry_after) = error.get("retry_after").and_then(|v| v.as_u64())
        {
            return Some(retry_after);
        }
    }
    None
}
