//! Error types for Modelrelay

use thiserror::Error;

use crate::catalog::Tier;
use crate::llm::TransportError;

/// Result type alias using Modelrelay's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Modelrelay error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Catalog errors (E100-E199)
    #[error("Failed to fetch model catalog: {0}")]
    FetchFailed(String),

    #[error("No model catalog available. The upstream catalog has never been fetched successfully.")]
    NoCatalogAvailable,

    // Routing errors (E200-E299)
    #[error("Model '{0}' is not in the catalog. Run `modelrelay catalog` to see all models.")]
    UnknownModel(String),

    #[error("Every model in tier '{tier}' is cooling down (requested '{model}')")]
    TierExhausted { model: String, tier: Tier },

    #[error(
        "Routing exhausted for '{requested}' after {attempts} attempt(s) in tier '{tier}' (tried: {}): {last_error}",
        .attempted.join(", ")
    )]
    Exhausted {
        requested: String,
        tier: Tier,
        attempted: Vec<String>,
        attempts: u32,
        last_error: Box<Error>,
    },

    #[error("Request cancelled by caller")]
    Cancelled,

    // Transport errors (E300-E399)
    #[error(transparent)]
    Upstream(#[from] TransportError),

    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No upstream API token found. Set MODELRELAY_API_KEY or GITHUB_TOKEN.")]
    CredentialsMissing,
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::FetchFailed(_) => "E100",
            Self::NoCatalogAvailable => "E101",
            Self::UnknownModel(_) => "E200",
            Self::TierExhausted { .. } => "E201",
            Self::Exhausted { .. } => "E202",
            Self::Cancelled => "E203",
            Self::Upstream(_) => "E300",
            Self::NetworkError(_) => "E301",
            Self::ConfigError(_) => "E600",
            Self::CredentialsMissing => "E601",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NoCatalogAvailable => {
                Some("Check connectivity to the upstream catalog endpoint".to_string())
            }
            Self::UnknownModel(_) => Some("modelrelay catalog".to_string()),
            Self::TierExhausted { tier, .. } | Self::Exhausted { tier, .. } => Some(format!(
                "Wait for the '{}' tier cooldown to expire or request a model from another tier",
                tier
            )),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::CredentialsMissing => {
                Some("export MODELRELAY_API_KEY=<token> or GITHUB_TOKEN=<token>".to_string())
            }
            _ => None,
        }
    }

    /// Whether this error is a rate-limit signal from the transport
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Upstream(e) if e.is_rate_limited())
    }

    /// Models attempted before the error was raised, if the error carries them
    ///
    /// Only [`Error::Exhausted`] does. An `Upstream` failure names the model it
    /// came from; earlier attempts are in the routing events.
    pub fn attempted(&self) -> &[String] {
        match self {
            Self::Exhausted { attempted, .. } => attempted,
            _ => &[],
        }
    }
}
