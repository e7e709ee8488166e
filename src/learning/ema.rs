//! Shared EMA tracker over the three recommendation variables
//!
//! Backs both the per-user shadow model and the per-cohort seed model. Each
//! scope keeps `ema_k <- clip((1 - a) * ema_k + a * nudge_k * s, cap)`, where
//! `s` is the session sentiment (0.1 when the sentiment is exactly neutral,
//! so neutral sessions still register the direction tried).

use crate::config::EmaConfig;
use crate::error::Result;
use crate::storage::{DocPath, JsonStore};
use crate::types::{clip, schema_version, Overlay};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sentiment stand-in for exactly neutral sessions
const NEUTRAL_WEIGHT: f64 = 0.1;

/// Persisted tracker state for one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmaState {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub scope: String,
    #[serde(default)]
    pub ema: Overlay,
    #[serde(default)]
    pub n: u32,
}

impl EmaState {
    pub fn new(scope: &str) -> Self {
        Self {
            schema_version: schema_version(),
            scope: scope.to_string(),
            ema: Overlay::ZERO,
            n: 0,
        }
    }

    /// Fold one observation into the average
    pub fn fold(&mut self, nudges: &Overlay, sentiment: f64, alpha: f64, cap: f64) {
        let weight = if sentiment == 0.0 {
            NEUTRAL_WEIGHT
        } else {
            clip(sentiment, 1.0)
        };
        for (key, nudge) in nudges.iter() {
            let nudge = if nudge.is_finite() { nudge } else { 0.0 };
            let next = (1.0 - alpha) * self.ema.get(key) + alpha * nudge * weight;
            self.ema.set(key, clip(next, cap));
        }
        self.n = self.n.saturating_add(1);
        self.schema_version = schema_version();
    }
}

/// Store-backed EMA tracker rooted at one document directory
pub struct EmaTracker {
    store: Arc<JsonStore>,
    dir: &'static str,
    config: EmaConfig,
}

impl EmaTracker {
    pub fn new(store: Arc<JsonStore>, dir: &'static str, config: EmaConfig) -> Self {
        Self { store, dir, config }
    }

    pub fn cap(&self) -> f64 {
        self.config.cap
    }

    fn doc(&self, scope: &str) -> Result<DocPath> {
        DocPath::scoped(self.dir, scope)
    }

    /// Stored state, `None` when the scope has never been updated
    pub fn load(&self, scope: &str) -> Result<Option<EmaState>> {
        Ok(self.store.load(&self.doc(scope)?))
    }

    pub fn update(&self, scope: &str, nudges: &Overlay, sentiment: f64) -> Result<EmaState> {
        let (alpha, cap) = (self.config.alpha, self.config.cap);
        self.store.update(
            &self.doc(scope)?,
            || EmaState::new(scope),
            |state| {
                state.fold(nudges, sentiment, alpha, cap);
                state.clone()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::paths;
    use tempfile::TempDir;

    #[test]
    fn test_fold_update_rule() {
        let mut state = EmaState::new("u1");
        state.fold(&Overlay::new(0.2, -0.2, 0.0), 1.0, 0.2, 0.3);
        assert!((state.ema.temp_delta - 0.04).abs() < 1e-9);
        assert!((state.ema.grind_delta + 0.04).abs() < 1e-9);
        assert_eq!(state.ema.agitation_delta, 0.0);
        assert_eq!(state.n, 1);
    }

    #[test]
    fn test_neutral_sentiment_uses_small_weight() {
        let mut state = EmaState::new("u1");
        state.fold(&Overlay::new(0.2, 0.0, 0.0), 0.0, 0.2, 0.3);
        assert!((state.ema.temp_delta - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_cap_holds() {
        let mut state = EmaState::new("u1");
        for _ in 0..500 {
            state.fold(&Overlay::new(10.0, -10.0, 10.0), 1.0, 0.2, 0.3);
        }
        assert!((state.ema.temp_delta - 0.3).abs() < 1e-9);
        assert!((state.ema.grind_delta + 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_tracker_persists_per_scope() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::open(dir.path()).unwrap());
        let tracker = EmaTracker::new(store, paths::SHADOW, EmaConfig::default());

        assert!(tracker.load("u1").unwrap().is_none());
        tracker.update("u1", &Overlay::new(0.2, 0.0, 0.0), 1.0).unwrap();
        tracker.update("u1", &Overlay::new(0.2, 0.0, 0.0), 1.0).unwrap();

        let state = tracker.load("u1").unwrap().unwrap();
        assert_eq!(state.n, 2);
        assert!(state.ema.temp_delta > 0.04);
        assert!(tracker.load("u2").unwrap().is_none());
    }
}
