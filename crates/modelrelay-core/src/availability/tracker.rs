//! Per-model cooldown tracking
//!
//! A model is disabled for a fixed window after a rate-limit signal. Expiry is
//! lazy: the first availability query after the window closes removes the
//! record, and reporting calls sweep every lapsed record so ids that left the
//! catalog do not linger. Each model's record lives in its own DashMap shard entry, so reads and
//! writes for one id are atomic with respect to each other.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{CatalogSnapshot, Tier};
use crate::clock::{Clock, SystemClock};

/// Default cooldown after a rate-limit signal
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Availability of one model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityState {
    Available,
    Disabled,
}

/// Cooldown record for a disabled model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityRecord {
    pub disabled_at: Instant,
    pub cooldown: Duration,
}

impl AvailabilityRecord {
    /// When the model becomes available again
    pub fn available_at(&self) -> Instant {
        self.disabled_at + self.cooldown
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.available_at()
    }

    /// Time left in the cooldown window
    pub fn remaining(&self, now: Instant) -> Duration {
        self.available_at().saturating_duration_since(now)
    }
}

/// Tracker statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AvailabilityStats {
    /// Disable calls since creation
    pub total_disables: u64,
    /// Records held after sweeping lapsed windows
    pub tracked_models: usize,
    /// Models inside an active cooldown window
    pub currently_disabled: usize,
}

/// Process-wide availability state keyed by model id
#[derive(Debug)]
pub struct AvailabilityTracker {
    records: DashMap<String, AvailabilityRecord>,
    clock: Arc<dyn Clock>,
    default_cooldown: Duration,
    total_disables: AtomicU64,
}

impl Default for AvailabilityTracker {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), DEFAULT_COOLDOWN)
    }
}

impl AvailabilityTracker {
    pub fn new(clock: Arc<dyn Clock>, default_cooldown: Duration) -> Self {
        Self {
            records: DashMap::new(),
            clock,
            default_cooldown,
            total_disables: AtomicU64::new(0),
        }
    }

    /// Cooldown applied by [`Self::disable`]
    pub fn default_cooldown(&self) -> Duration {
        self.default_cooldown
    }

    /// Whether the model may be attempted now. Unknown ids are available.
    pub fn is_available(&self, model_id: &str) -> bool {
        if !self.records.contains_key(model_id) {
            return true;
        }

        let now = self.clock.now();
        match self.records.entry(model_id.to_string()) {
            Entry::Occupied(entry) => {
                if entry.get().is_expired(now) {
                    entry.remove();
                    debug!(model = %model_id, "Cooldown expired, model available again");
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => true,
        }
    }

    pub fn state(&self, model_id: &str) -> AvailabilityState {
        if self.is_available(model_id) {
            AvailabilityState::Available
        } else {
            AvailabilityState::Disabled
        }
    }

    /// Disable a model for `cooldown`, replacing any existing window
    pub fn mark_disabled(&self, model_id: &str, cooldown: Duration) {
        let record = AvailabilityRecord {
            disabled_at: self.clock.now(),
            cooldown,
        };
        self.records.insert(model_id.to_string(), record);
        self.total_disables.fetch_add(1, Ordering::Relaxed);

        warn!(
            model = %model_id,
            cooldown_secs = cooldown.as_secs(),
            "Model rate limited, disabled for cooldown"
        );
    }

    /// Disable a model for the default cooldown
    pub fn disable(&self, model_id: &str) {
        self.mark_disabled(model_id, self.default_cooldown);
    }

    /// Lift a cooldown early. Returns whether a record was removed.
    pub fn clear(&self, model_id: &str) -> bool {
        self.records.remove(model_id).is_some()
    }

    /// Available models of one tier, in catalog order
    pub fn list_available(&self, tier: Tier, catalog: &CatalogSnapshot) -> Vec<String> {
        catalog
            .in_tier(tier)
            .filter(|model| self.is_available(&model.id))
            .map(|model| model.id.clone())
            .collect()
    }

    /// Time left before a disabled model is available again
    pub fn remaining_cooldown(&self, model_id: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.records
            .get(model_id)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.remaining(now))
    }

    /// Drop every record whose window has closed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        let swept = before.saturating_sub(self.records.len());
        if swept > 0 {
            debug!(swept, "Swept lapsed cooldown records");
        }
        swept
    }

    /// Models inside an active cooldown window, sorted by id
    pub fn disabled_models(&self) -> Vec<(String, Duration)> {
        self.sweep_expired();

        let now = self.clock.now();
        let mut disabled: Vec<(String, Duration)> = self
            .records
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| (entry.key().clone(), entry.value().remaining(now)))
            .collect();
        disabled.sort_by(|a, b| a.0.cmp(&b.0));
        disabled
    }

    pub fn stats(&self) -> AvailabilityStats {
        let currently_disabled = self.disabled_models().len();
        AvailabilityStats {
            total_disables: self.total_disables.load(Ordering::Relaxed),
            tracked_models: self.records.len(),
            currently_disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelDescriptor;
    use crate::clock::ManualClock;

    fn tracker() -> (AvailabilityTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (AvailabilityTracker::new(clock.clone(), DEFAULT_COOLDOWN), clock)
    }

    #[test]
    fn test_unknown_model_is_available() {
        let (tracker, _) = tracker();
        assert!(tracker.is_available("openai/gpt-4.1"));
        assert_eq!(tracker.state("openai/gpt-4.1"), AvailabilityState::Available);
    }

    #[test]
    fn test_cooldown_expiry() {
        let (tracker, clock) = tracker();

        tracker.mark_disabled("a", Duration::from_secs(300));
        assert!(!tracker.is_available("a"));

        clock.advance(Duration::from_secs(299));
        assert!(!tracker.is_available("a"));
        assert_eq!(tracker.remaining_cooldown("a"), Some(Duration::from_secs(1)));

        clock.advance(Duration::from_secs(2));
        assert!(tracker.is_available("a"));
        // Lazy expiry removed the record
        assert_eq!(tracker.stats().tracked_models, 0);
        assert_eq!(tracker.remaining_cooldown("a"), None);
    }

    #[test]
    fn test_disable_is_idempotent_and_resets_window() {
        let (tracker, clock) = tracker();

        tracker.disable("a");
        clock.advance(Duration::from_secs(200));
        tracker.disable("a");
        clock.advance(Duration::from_secs(200));

        // 400s after the first disable, 200s after the second
        assert!(!tracker.is_available("a"));
        assert_eq!(tracker.stats().tracked_models, 1);
        assert_eq!(tracker.stats().total_disables, 2);
    }

    #[test]
    fn test_clear() {
        let (tracker, _) = tracker();

        tracker.disable("a");
        assert!(tracker.clear("a"));
        assert!(tracker.is_available("a"));
        assert!(!tracker.clear("a"));
    }

    #[test]
    fn test_list_available_keeps_catalog_order() {
        let (tracker, _) = tracker();
        let catalog = CatalogSnapshot::new(
            1,
            vec![
                ModelDescriptor::new("a", "p", Tier::High),
                ModelDescriptor::new("x", "p", Tier::Low),
                ModelDescriptor::new("b", "p", Tier::High),
                ModelDescriptor::new("c", "p", Tier::High),
            ],
            Instant::now(),
            Duration::from_secs(300),
        );

        tracker.disable("b");
        assert_eq!(tracker.list_available(Tier::High, &catalog), vec!["a", "c"]);
        assert_eq!(tracker.list_available(Tier::Low, &catalog), vec!["x"]);
        assert!(tracker.list_available(Tier::Embedding, &catalog).is_empty());
    }

    #[test]
    fn test_disabled_models_sorted_and_stats() {
        let (tracker, clock) = tracker();

        tracker.mark_disabled("z", Duration::from_secs(600));
        tracker.mark_disabled("m", Duration::from_secs(60));
        clock.advance(Duration::from_secs(30));

        let disabled = tracker.disabled_models();
        assert_eq!(disabled.len(), 2);
        assert_eq!(disabled[0], ("m".to_string(), Duration::from_secs(30)));
        assert_eq!(disabled[1].0, "z");

        clock.advance(Duration::from_secs(60));
        let stats = tracker.stats();
        assert_eq!(stats.currently_disabled, 1);
        assert_eq!(stats.tracked_models, 1);
        assert_eq!(stats.total_disables, 2);
    }

    #[test]
    fn test_lapsed_records_are_swept_without_queries() {
        let (tracker, clock) = tracker();

        // Ids that are never queried again, e.g. dropped from the catalog
        tracker.mark_disabled("gone/a", Duration::from_secs(10));
        tracker.mark_disabled("gone/b", Duration::from_secs(20));
        tracker.mark_disabled("kept", Duration::from_secs(600));

        clock.advance(Duration::from_secs(15));
        assert_eq!(tracker.sweep_expired(), 1);

        clock.advance(Duration::from_secs(10));
        let stats = tracker.stats();
        assert_eq!(stats.tracked_models, 1);
        assert_eq!(stats.currently_disabled, 1);
        assert_eq!(tracker.sweep_expired(), 0);
        assert!(!tracker.is_available("kept"));
    }

    #[test]
    fn test_concurrent_disable_and_query() {
        let tracker = Arc::new(AvailabilityTracker::default());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.disable("shared");
                        let _ = tracker.is_available("shared");
                        let _ = tracker.is_available(&format!("model-{}", i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!tracker.is_available("shared"));
        assert_eq!(tracker.stats().total_disables, 800);
    }
}
