//! Per-user shadow model
//!
//! An always-on EMA of the deltas a user actually brewed, weighted by how
//! much they liked the result. Merged into every composed overlay.

use super::ema::{EmaState, EmaTracker};
use super::sources::DiagnosticSource;
use crate::config::EmaConfig;
use crate::error::Result;
use crate::storage::{paths, JsonStore};
use crate::types::Overlay;
use std::sync::Arc;
use tracing::warn;

pub struct ShadowModel {
    tracker: EmaTracker,
}

impl ShadowModel {
    pub fn new(store: Arc<JsonStore>, config: EmaConfig) -> Self {
        Self {
            tracker: EmaTracker::new(store, paths::SHADOW, config),
        }
    }

    pub fn update(&self, user_id: &str, nudges: &Overlay, sentiment: f64) -> Result<EmaState> {
        self.tracker.update(user_id, nudges, sentiment)
    }

    /// Current shadow deltas, `None` when empty
    pub fn overlay(&self, user_id: &str) -> Result<Option<Overlay>> {
        let cap = self.tracker.cap();
        Ok(self
            .tracker
            .load(user_id)?
            .map(|state| state.ema.clamped(cap))
            .filter(|o| !o.is_zero()))
    }
}

impl DiagnosticSource for ShadowModel {
    fn shadow_overlay(&self, user_id: &str) -> Option<Overlay> {
        self.overlay(user_id).unwrap_or_else(|e| {
            warn!("Shadow model unavailable for {}: {}", user_id, e);
            None
        })
    }
}
