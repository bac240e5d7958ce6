//! Catalog store with TTL refresh and stale-while-revalidate
//!
//! Readers get an `Arc<CatalogSnapshot>` and keep using it for as long as they
//! like; a refresh installs a new snapshot without touching old ones. Refreshes
//! are single-flight: concurrent callers that find the snapshot expired wait on
//! one upstream fetch and share its outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::rules::TierRules;
use super::types::{CatalogSnapshot, ModelDescriptor, Tier};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::llm::{ListedModel, ModelLister};

/// Default snapshot lifetime
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(300);

/// Shared, refreshable model catalog
pub struct CatalogStore {
    lister: Arc<dyn ModelLister>,
    clock: Arc<dyn Clock>,
    rules: TierRules,
    ttl: Duration,
    model_prefix: String,
    current: RwLock<Option<Arc<CatalogSnapshot>>>,
    refresh_lock: Mutex<()>,
    /// Bumped after every completed fetch attempt, successful or not
    refresh_generation: AtomicU64,
    next_version: AtomicU64,
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore")
            .field("ttl", &self.ttl)
            .field("model_prefix", &self.model_prefix)
            .field("rules", &self.rules.len())
            .field(
                "refresh_generation",
                &self.refresh_generation.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// Builder for [`CatalogStore`]
pub struct CatalogStoreBuilder {
    lister: Arc<dyn ModelLister>,
    clock: Arc<dyn Clock>,
    rules: TierRules,
    ttl: Duration,
    model_prefix: String,
}

impl CatalogStoreBuilder {
    fn new(lister: Arc<dyn ModelLister>) -> Self {
        Self {
            lister,
            clock: Arc::new(SystemClock),
            rules: TierRules::with_defaults(),
            ttl: DEFAULT_CATALOG_TTL,
            model_prefix: String::new(),
        }
    }

    /// Set the time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the tier rule table
    pub fn rules(mut self, rules: TierRules) -> Self {
        self.rules = rules;
        self
    }

    /// Set the snapshot lifetime
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the prefix accepted in front of model ids
    pub fn model_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.model_prefix = prefix.into();
        self
    }

    /// Build the store. No fetch happens until first use.
    pub fn build(self) -> CatalogStore {
        CatalogStore {
            lister: self.lister,
            clock: self.clock,
            rules: self.rules,
            ttl: self.ttl,
            model_prefix: self.model_prefix,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
            next_version: AtomicU64::new(1),
        }
    }
}

impl CatalogStore {
    /// Create a store with default rules, TTL, and the system clock
    pub fn new(lister: Arc<dyn ModelLister>) -> Self {
        Self::builder(lister).build()
    }

    /// Create a builder
    pub fn builder(lister: Arc<dyn ModelLister>) -> CatalogStoreBuilder {
        CatalogStoreBuilder::new(lister)
    }

    /// Snapshot lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The installed snapshot, without triggering a refresh
    pub async fn current(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current.read().await.clone()
    }

    /// A usable snapshot: fresh if possible, stale if the refresh fails
    pub async fn get(&self) -> Result<Arc<CatalogSnapshot>> {
        let generation = self.refresh_generation.load(Ordering::Acquire);

        if let Some(snapshot) = self.current().await
            && snapshot.is_fresh(self.clock.now())
        {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;

        // Someone else fetched while we waited for the lock; share their outcome
        if self.refresh_generation.load(Ordering::Acquire) != generation {
            debug!("Reusing catalog refresh completed by another caller");
            return self.current().await.ok_or(Error::NoCatalogAvailable);
        }

        match self.refresh_locked().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => match self.current().await {
                Some(stale) => {
                    warn!(
                        error = %e,
                        version = stale.version(),
                        "Catalog refresh failed, serving stale snapshot"
                    );
                    Ok(stale)
                }
                None => {
                    warn!(error = %e, "Catalog refresh failed with no snapshot to fall back on");
                    Err(Error::NoCatalogAvailable)
                }
            },
        }
    }

    /// Force a fetch. On failure the previous snapshot stays installed.
    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Models of one tier, in catalog order
    pub async fn models_in_tier(&self, tier: Tier) -> Result<Vec<Arc<ModelDescriptor>>> {
        let snapshot = self.get().await?;
        Ok(snapshot.in_tier(tier).cloned().collect())
    }

    /// Every model id with the routing prefix attached
    pub async fn qualified_ids(&self) -> Result<Vec<String>> {
        Ok(self.get().await?.qualified_ids())
    }

    /// Caller must hold `refresh_lock`
    async fn refresh_locked(&self) -> Result<Arc<CatalogSnapshot>> {
        let outcome = self.fetch_and_install().await;
        // A waiter that sees the new generation must also see its snapshot
        self.refresh_generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn fetch_and_install(&self) -> Result<Arc<CatalogSnapshot>> {
        let listed = self
            .lister
            .list_models()
            .await
            .map_err(|e| Error::FetchFailed(e.to_string()))?;
        if listed.is_empty() {
            return Err(Error::FetchFailed(
                "upstream returned an empty model listing".to_string(),
            ));
        }

        let snapshot = Arc::new(self.build_snapshot(listed));
        *self.current.write().await = Some(snapshot.clone());

        info!(
            version = snapshot.version(),
            models = snapshot.len(),
            ttl_secs = self.ttl.as_secs(),
            "Installed catalog snapshot"
        );

        Ok(snapshot)
    }

    fn build_snapshot(&self, listed: Vec<ListedModel>) -> CatalogSnapshot {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let descriptors = listed.into_iter().map(|model| self.describe(model));

        CatalogSnapshot::new(version, descriptors, self.clock.now(), self.ttl)
            .with_model_prefix(self.model_prefix.clone())
    }

    fn describe(&self, model: ListedModel) -> ModelDescriptor {
        let provider = model.resolved_provider();
        let tier = self
            .rules
            .classify(&provider, &model.id, model.rate_limit_tier.as_deref());

        let mut capabilities = model.capabilities;
        if capabilities.is_empty() {
            capabilities.insert(match tier {
                Tier::Embedding => "embedding".to_string(),
                _ => "chat".to_string(),
            });
        }

        ModelDescriptor {
            name: model.name.unwrap_or_else(|| model.id.clone()),
            id: model.id,
            provider,
            tier,
            capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::llm::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Lister that counts calls and can be switched into failure mode
    struct CountingLister {
        calls: AtomicUsize,
        failing: std::sync::atomic::AtomicBool,
        models: Vec<ListedModel>,
    }

    impl CountingLister {
        fn new(models: Vec<ListedModel>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: std::sync::atomic::AtomicBool::new(false),
                models,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn fail(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ModelLister for CountingLister {
        async fn list_models(&self) -> std::result::Result<Vec<ListedModel>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportError::new(
                    "",
                    crate::llm::TransportErrorKind::Network,
                    "connection refused",
                ));
            }
            Ok(self.models.clone())
        }
    }

    fn listing() -> Vec<ListedModel> {
        vec![
            ListedModel::new("openai/gpt-4.1"),
            ListedModel::new("openai/gpt-4o-mini"),
            ListedModel::new("openai/text-embedding-3-small"),
            ListedModel::new("meta/llama-3.3-70b-instruct"),
        ]
    }

    fn store(lister: Arc<CountingLister>, clock: Arc<ManualClock>) -> CatalogStore {
        CatalogStore::builder(lister)
            .clock(clock)
            .ttl(Duration::from_secs(300))
            .model_prefix("github/")
            .build()
    }

    #[tokio::test]
    async fn test_first_get_fetches_and_classifies() {
        let lister = CountingLister::new(listing());
        let store = store(lister.clone(), Arc::new(ManualClock::new()));

        assert!(store.current().await.is_none());
        let snapshot = store.get().await.unwrap();

        assert_eq!(lister.calls(), 1);
        assert_eq!(snapshot.version(), 1);
        assert_eq!(snapshot.tier_of("openai/gpt-4.1"), Some(Tier::High));
        assert_eq!(snapshot.tier_of("openai/gpt-4o-mini"), Some(Tier::Low));
        assert_eq!(
            snapshot.tier_of("github/openai/text-embedding-3-small"),
            Some(Tier::Embedding)
        );

        let embedding = snapshot.get("openai/text-embedding-3-small").unwrap();
        assert!(embedding.has_capability("embedding"));
        assert_eq!(embedding.provider, "openai");
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_not_refetched() {
        let lister = CountingLister::new(listing());
        let clock = Arc::new(ManualClock::new());
        let store = store(lister.clone(), clock.clone());

        store.get().await.unwrap();
        clock.advance(Duration::from_secs(299));
        store.get().await.unwrap();

        assert_eq!(lister.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_refreshed() {
        let lister = CountingLister::new(listing());
        let clock = Arc::new(ManualClock::new());
        let store = store(lister.clone(), clock.clone());

        store.get().await.unwrap();
        clock.advance(Duration::from_secs(301));
        let snapshot = store.get().await.unwrap();

        assert_eq!(lister.calls(), 2);
        assert_eq!(snapshot.version(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale() {
        let lister = CountingLister::new(listing());
        let clock = Arc::new(ManualClock::new());
        let store = store(lister.clone(), clock.clone());

        let first = store.get().await.unwrap();
        lister.fail(true);
        clock.advance(Duration::from_secs(600));

        let stale = store.get().await.unwrap();
        assert_eq!(stale.version(), first.version());
        assert!(Arc::ptr_eq(&first, &stale));
    }

    #[tokio::test]
    async fn test_failure_without_snapshot() {
        let lister = CountingLister::new(listing());
        lister.fail(true);
        let store = store(lister, Arc::new(ManualClock::new()));

        let err = store.get().await.unwrap_err();
        assert!(matches!(err, Error::NoCatalogAvailable));
    }

    #[tokio::test]
    async fn test_forced_refresh_keeps_old_snapshot_on_failure() {
        let lister = CountingLister::new(listing());
        let store = store(lister.clone(), Arc::new(ManualClock::new()));

        store.get().await.unwrap();
        lister.fail(true);

        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, Error::FetchFailed(_)));
        assert_eq!(store.current().await.unwrap().version(), 1);
    }

    #[tokio::test]
    async fn test_empty_listing_is_a_failed_fetch() {
        let lister = CountingLister::new(Vec::new());
        let store = store(lister, Arc::new(ManualClock::new()));

        assert!(matches!(store.refresh().await, Err(Error::FetchFailed(_))));
        assert!(store.current().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_fetch() {
        let lister = CountingLister::new(listing());
        let store = Arc::new(store(lister.clone(), Arc::new(ManualClock::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get().await.map(|s| s.version()) })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }
        assert_eq!(lister.calls(), 1);
    }

    #[tokio::test]
    async fn test_models_in_tier_and_qualified_ids() {
        let lister = CountingLister::new(listing());
        let store = store(lister, Arc::new(ManualClock::new()));

        let high: Vec<String> = store
            .models_in_tier(Tier::High)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        assert_eq!(high, vec!["openai/gpt-4.1", "meta/llama-3.3-70b-instruct"]);

        let ids = store.qualified_ids().await.unwrap();
        assert!(ids.contains(&"github/openai/gpt-4o-mini".to_string()));
    }

    #[tokio::test]
    async fn test_upstream_tier_hint_wins() {
        let lister = CountingLister::new(vec![
            ListedModel::new("openai/gpt-4o-mini").with_tier_hint("high"),
        ]);
        let store = store(lister, Arc::new(ManualClock::new()));

        let snapshot = store.get().await.unwrap();
        assert_eq!(snapshot.tier_of("openai/gpt-4o-mini"), Some(Tier::High));
    }
}
