//! Cohort seed model for cold starts
//!
//! Aggregates what worked for everyone brewing the same kind of coffee
//! (`process|roast|filter`). Once a cohort has enough sessions its EMA is
//! exposed at half strength, tilted by the request's goal tags.

use super::ema::{EmaState, EmaTracker};
use super::features::{leans_body, leans_clarity};
use super::sources::SeedSource;
use crate::config::{CohortConfig, EmaConfig};
use crate::error::Result;
use crate::storage::{paths, JsonStore};
use crate::types::{BrewContext, Overlay};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CohortModel {
    tracker: EmaTracker,
    min_sessions: u32,
}

impl CohortModel {
    pub fn new(store: Arc<JsonStore>, config: &CohortConfig) -> Self {
        let ema = EmaConfig {
            alpha: config.alpha,
            cap: config.cap,
        };
        Self {
            tracker: EmaTracker::new(store, paths::COHORTS, ema),
            min_sessions: config.min_sessions,
        }
    }

    /// Fold a session into its cohort; contexts with no cohort dimension are skipped
    pub fn update(&self, context: &BrewContext, nudges: &Overlay, sentiment: f64) -> Result<Option<EmaState>> {
        if !context.has_cohort() {
            return Ok(None);
        }
        let state = self.tracker.update(&context.cohort_key(), nudges, sentiment)?;
        debug!("Cohort {} now has {} sessions", state.scope, state.n);
        Ok(Some(state))
    }

    /// Half-strength seed, goal-tilted; `None` below the session minimum
    pub fn seed_overlay(&self, context: &BrewContext, goal_tags: &[String]) -> Result<Option<Overlay>> {
        let Some(state) = self.tracker.load(&context.cohort_key())? else {
            return Ok(None);
        };
        if state.n < self.min_sessions {
            return Ok(None);
        }

        let mut seed = state.ema.clamped(self.tracker.cap()).scaled(0.5);

        if leans_clarity(goal_tags) {
            if seed.temp_delta > 0.0 {
                seed.temp_delta *= 0.5;
            }
            if seed.agitation_delta > 0.0 {
                seed.agitation_delta *= 0.5;
            }
        }
        if leans_body(goal_tags) {
            if seed.temp_delta < 0.0 {
                seed.temp_delta *= 0.5;
            }
            if seed.agitation_delta < 0.0 {
                seed.agitation_delta *= 0.5;
            }
        }

        Ok((!seed.is_zero()).then_some(seed))
    }
}

impl SeedSource for CohortModel {
    fn cohort_seed(&self, context: &BrewContext, goal_tags: &[String]) -> Option<Overlay> {
        self.seed_overlay(context, goal_tags).unwrap_or_else(|e| {
            warn!("Cohort seed unavailable for {}: {}", context.cohort_key(), e);
            None
        })
    }
}
