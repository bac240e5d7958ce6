//! Catalog data model
//!
//! A [`CatalogSnapshot`] is an immutable, versioned view of every routable model.
//! Snapshots are built once per refresh and replaced wholesale; nothing inside
//! one is ever mutated after construction.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Rate-limit class grouping models with comparable throughput ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Generous limits, flagship chat models
    High,
    /// Tight limits, small or unclassified models
    Low,
    /// Per-model limits, reasoning models
    Custom,
    /// Embedding models
    #[serde(alias = "embeddings")]
    Embedding,
}

impl Tier {
    /// All tiers in display order
    pub const ALL: [Tier; 4] = [Tier::High, Tier::Low, Tier::Custom, Tier::Embedding];
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Low => write!(f, "low"),
            Self::Custom => write!(f, "custom"),
            Self::Embedding => write!(f, "embedding"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            "custom" => Ok(Self::Custom),
            "embedding" | "embeddings" => Ok(Self::Embedding),
            _ => Err(format!("Unknown rate-limit tier: {}", s)),
        }
    }
}

/// One routable backend model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Globally unique model id (e.g., "openai/gpt-4.1")
    pub id: String,
    /// Provider namespace (e.g., "openai")
    pub provider: String,
    /// Human-readable name
    pub name: String,
    /// Rate-limit tier
    pub tier: Tier,
    /// Capability tags ("chat", "embedding", "vision", ...)
    pub capabilities: BTreeSet<String>,
}

impl ModelDescriptor {
    /// Create a descriptor with no capability tags
    pub fn new(id: impl Into<String>, provider: impl Into<String>, tier: Tier) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            tier,
            capabilities: BTreeSet::new(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a capability tag
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Whether the model advertises a capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Immutable point-in-time view of the catalog
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    version: u64,
    /// Models in upstream insertion order
    models: Vec<Arc<ModelDescriptor>>,
    /// id -> position in `models`
    index: HashMap<String, usize>,
    fetched_at: Instant,
    ttl: Duration,
    /// Routing prefix callers may put in front of ids (e.g., "github/")
    model_prefix: String,
}

impl CatalogSnapshot {
    /// Build a snapshot. Later duplicates of an id are dropped.
    pub fn new(
        version: u64,
        descriptors: impl IntoIterator<Item = ModelDescriptor>,
        fetched_at: Instant,
        ttl: Duration,
    ) -> Self {
        let mut models = Vec::new();
        let mut index = HashMap::new();

        for descriptor in descriptors {
            if index.contains_key(&descriptor.id) {
                continue;
            }
            index.insert(descriptor.id.clone(), models.len());
            models.push(Arc::new(descriptor));
        }

        Self {
            version,
            models,
            index,
            fetched_at,
            ttl,
            model_prefix: String::new(),
        }
    }

    /// Set the routing prefix accepted in front of model ids
    pub fn with_model_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.model_prefix = prefix.into();
        self
    }

    /// Monotonic snapshot version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When the listing was fetched
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// How long the snapshot stays fresh
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Instant at which the snapshot expires
    pub fn expires_at(&self) -> Instant {
        self.fetched_at + self.ttl
    }

    /// Whether the snapshot is still within its TTL
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at()
    }

    /// Canonical id for a possibly prefixed model id
    pub fn resolve_id<'a>(&self, model_id: &'a str) -> Option<&'a str> {
        if self.index.contains_key(model_id) {
            return Some(model_id);
        }
        if self.model_prefix.is_empty() {
            return None;
        }
        model_id
            .strip_prefix(self.model_prefix.as_str())
            .filter(|stripped| self.index.contains_key(*stripped))
    }

    /// Look up a model by id (prefixed ids are accepted)
    pub fn get(&self, model_id: &str) -> Option<&Arc<ModelDescriptor>> {
        let id = self.resolve_id(model_id)?;
        self.index.get(id).map(|&i| &self.models[i])
    }

    /// Whether the catalog knows a model
    pub fn contains(&self, model_id: &str) -> bool {
        self.resolve_id(model_id).is_some()
    }

    /// Tier of a model
    pub fn tier_of(&self, model_id: &str) -> Option<Tier> {
        self.get(model_id).map(|m| m.tier)
    }

    /// Position of a model in insertion order
    pub fn position(&self, model_id: &str) -> Option<usize> {
        let id = self.resolve_id(model_id)?;
        self.index.get(id).copied()
    }

    /// All models in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.models.iter()
    }

    /// Models of one tier in insertion order
    pub fn in_tier(&self, tier: Tier) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.models.iter().filter(move |m| m.tier == tier)
    }

    /// Every model id with the routing prefix attached
    pub fn qualified_ids(&self) -> Vec<String> {
        self.models
            .iter()
            .map(|m| format!("{}{}", self.model_prefix, m.id))
            .collect()
    }

    /// Number of models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the snapshot has no models
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
