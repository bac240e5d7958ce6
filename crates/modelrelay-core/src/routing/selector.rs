//! Same-tier fallback selection
//!
//! Given a requested model, pick the model that should serve the request: the
//! requested one if it is available, otherwise an available model of the same
//! tier. Substitutes never cross tiers. Among substitutes, models not yet tried
//! in the current dispatch come first, then catalog order breaks ties.

use std::sync::Arc;

use tracing::debug;

use super::types::Selection;
use crate::availability::AvailabilityTracker;
use crate::catalog::{CatalogSnapshot, ModelDescriptor};
use crate::error::{Error, Result};

/// Stateless selector; all state lives in the catalog and tracker
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSelector;

impl FallbackSelector {
    pub fn new() -> Self {
        Self
    }

    /// Choose the model to attempt for `requested`
    pub fn select(
        &self,
        requested: &str,
        catalog: &CatalogSnapshot,
        tracker: &AvailabilityTracker,
        tried: &[String],
    ) -> Result<Selection> {
        let model = catalog
            .get(requested)
            .ok_or_else(|| Error::UnknownModel(requested.to_string()))?;

        if tracker.is_available(&model.id) {
            return Ok(Selection {
                model: model.clone(),
                was_substituted: false,
            });
        }

        let candidates: Vec<String> = tracker
            .list_available(model.tier, catalog)
            .into_iter()
            .filter(|id| *id != model.id)
            .collect();

        let chosen = candidates
            .iter()
            .find(|id| !tried.contains(id))
            .or_else(|| candidates.first())
            .and_then(|id| catalog.get(id))
            .ok_or_else(|| Error::TierExhausted {
                model: model.id.clone(),
                tier: model.tier,
            })?;

        debug!(
            requested = %model.id,
            substitute = %chosen.id,
            tier = %model.tier,
            candidates = candidates.len(),
            "Selected same-tier substitute"
        );

        Ok(Selection {
            model: chosen.clone(),
            was_substituted: true,
        })
    }

    /// Choose a replacement after `failed` was rate limited mid-dispatch
    ///
    /// Only available same-tier models outside `tried` qualify; `failed` itself
    /// never does, even when its cooldown has already lapsed.
    pub fn substitute(
        &self,
        failed: &str,
        catalog: &CatalogSnapshot,
        tracker: &AvailabilityTracker,
        tried: &[String],
    ) -> Result<Selection> {
        let model = catalog
            .get(failed)
            .ok_or_else(|| Error::UnknownModel(failed.to_string()))?;

        let chosen = tracker
            .list_available(model.tier, catalog)
            .into_iter()
            .filter(|id| *id != model.id && !tried.contains(id))
            .find_map(|id| catalog.get(&id).cloned())
            .ok_or_else(|| Error::TierExhausted {
                model: model.id.clone(),
                tier: model.tier,
            })?;

        debug!(
            failed = %model.id,
            substitute = %chosen.id,
            tier = %model.tier,
            "Selected untried substitute"
        );

        Ok(Selection {
            model: chosen,
            was_substituted: true,
        })
    }

    /// Same-tier substitutes for `requested` in catalog order, ignoring availability
    pub fn fallback_order(
        &self,
        requested: &str,
        catalog: &CatalogSnapshot,
    ) -> Result<Vec<Arc<ModelDescriptor>>> {
        let model = catalog
            .get(requested)
            .ok_or_else(|| Error::UnknownModel(requested.to_string()))?;

        Ok(catalog
            .in_tier(model.tier)
            .filter(|candidate| candidate.id != model.id)
            .cloned()
            .collect())
    }
}
