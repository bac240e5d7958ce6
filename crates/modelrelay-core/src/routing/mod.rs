//! Rate-limit aware model routing
//!
//! The key components are:
//!
//! - **Fallback Selector**: picks the requested model when it is available, or a
//!   same-tier substitute when it is cooling down. Never crosses tiers.
//!
//! - **Resilient Dispatcher**: runs a completion, disables models that rate
//!   limit, and retries on substitutes within a fixed attempt budget.
//!
//! - **Routing Observers**: receive one [`RoutingEvent`] per attempt.
//!
//! ## How It Works
//!
//! 1. The dispatcher obtains a catalog snapshot and resolves the requested model
//! 2. The selector returns the requested model, or a substitute if it is disabled
//! 3. On a rate limit the model is disabled for its cooldown and step 2 repeats
//! 4. Any other failure, or a spent attempt budget, ends the request
//!
//! ## Example
//!
//! ```rust,ignore
//! use modelrelay_core::routing::ResilientDispatcher;
//! use modelrelay_core::llm::{ChatRequest, Message};
//!
//! let dispatcher = ResilientDispatcher::new(catalog, tracker, transport);
//! let request = ChatRequest::new(vec![Message::user("Hello")]);
//!
//! let outcome = dispatcher.route_and_complete("openai/gpt-4.1", &request).await?;
//! println!("served by {:?}", outcome.served_by());
//! ```

mod dispatcher;
mod observer;
mod selector;
mod types;

pub use dispatcher::{DEFAULT_MAX_ATTEMPTS, ResilientDispatcher, ResilientDispatcherBuilder};
pub use observer::{RoutingObserver, TracingObserver};
pub use selector::FallbackSelector;
pub use types::{AttemptOutcome, DispatchOutcome, RoutingDecision, RoutingEvent, Selection};
