//! Modelrelay Core Library
//!
//! This crate provides rate-limit aware routing over a multi-provider model
//! aggregator, including:
//! - Model catalog with tier classification and TTL refresh
//! - Per-model availability tracking with cooldowns
//! - Same-tier fallback selection
//! - Resilient completion dispatch with attempt budgets and cancellation
//! - HTTP transport for the aggregator API

pub mod availability;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod relay;
pub mod routing;

pub use error::{Error, Result};
pub use relay::ModelRelay;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::availability::AvailabilityTracker;
    pub use crate::catalog::{CatalogSnapshot, CatalogStore, ModelDescriptor, Tier};
    pub use crate::config::RelayConfig;
    pub use crate::error::{Error, Result};
    pub use crate::llm::{ChatRequest, CompletionTransport, LlmResponse, Message, ModelLister};
    pub use crate::relay::ModelRelay;
    pub use crate::routing::{DispatchOutcome, FallbackSelector, ResilientDispatcher};
}
