//! LLM integration - upstream aggregator API
//!
//! This module provides:
//! - The collaborator traits the routing core consumes (model listing, completion)
//! - Request/response types matching the OpenAI-compatible chat format
//! - An HTTP client for the GitHub Models aggregator implementing both traits

mod client;
mod transport;
mod types;

pub use client::{AggregatorClient, AggregatorClientBuilder, DEFAULT_BASE_URL};
pub use transport::{
    CompletionTransport, ListedModel, ModelLister, TransportError, TransportErrorKind,
};
pub use types::{
    ChatRequest, ChatResponse, Choice, FinishReason, LlmResponse, Message, MessageRole, Usage,
};
