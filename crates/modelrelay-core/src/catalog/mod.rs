//! Model catalog
//!
//! Lists every routable model with its rate-limit tier, caches the listing as an
//! immutable snapshot, and refreshes it when the TTL lapses.

mod rules;
mod store;
mod types;

pub use rules::{TierRule, TierRuleConfig, TierRules};
pub use store::{CatalogStore, CatalogStoreBuilder, DEFAULT_CATALOG_TTL};
pub use types::{CatalogSnapshot, ModelDescriptor, Tier};
