//! Overlay composition
//!
//! Sums the enabled sources in a fixed order, caps the early (prior and
//! preference) sum, layers the shadow model and planner on top, then applies
//! a cross-trait trust region and a final per-variable clamp.
//!
//! Composition is pure: it reads sources and returns a result. Telemetry and
//! the persisted explanation are recorded by the caller.

use super::explain;
use super::flags::FlagSet;
use super::sources::{
    DiagnosticSource, EdgeSource, PersonalSource, PlannerSource, ScheduleSource, SeedSource,
};
use crate::config::ComposerConfig;
use crate::storage::SessionStore;
use crate::types::{BrewContext, Overlay, OverlayResult, SourceTrace};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Changes smaller than this do not count as clipping
const CLIP_EPSILON: f64 = 1e-9;

/// Every source the composer may consult
#[derive(Clone)]
pub struct ComposerSources {
    pub seed: Arc<dyn SeedSource>,
    pub edges: Arc<dyn EdgeSource>,
    pub personal: Arc<dyn PersonalSource>,
    pub curriculum: Arc<dyn ScheduleSource>,
    pub practice: Arc<dyn ScheduleSource>,
    pub shadow: Arc<dyn DiagnosticSource>,
    pub planner: Arc<dyn PlannerSource>,
}

pub struct OverlayComposer {
    sources: ComposerSources,
    sessions: Arc<dyn SessionStore>,
    config: ComposerConfig,
    cold_start_sessions: usize,
}

impl OverlayComposer {
    pub fn new(
        sources: ComposerSources,
        sessions: Arc<dyn SessionStore>,
        config: ComposerConfig,
        cold_start_sessions: usize,
    ) -> Self {
        Self {
            sources,
            sessions,
            config,
            cold_start_sessions,
        }
    }

    fn is_cold_start(&self, user_id: &str) -> bool {
        match self.sessions.count_for_user(user_id) {
            Ok(count) => count < self.cold_start_sessions,
            Err(e) => {
                warn!("Session count unavailable for {}, skipping cohort seed: {}", user_id, e);
                false
            }
        }
    }

    pub fn compose(
        &self,
        user_id: &str,
        flags: &FlagSet,
        context: &BrewContext,
        goal_tags: &[String],
        now: DateTime<Utc>,
    ) -> OverlayResult {
        let mut trace = SourceTrace::default();
        let mut early = Overlay::ZERO;

        if flags.use_cohort_seed && self.is_cold_start(user_id) {
            if let Some(seed) = self.sources.seed.cohort_seed(context, goal_tags) {
                debug!("Cohort seed for {}: {:?}", context.cohort_key(), seed);
                trace.cohort += seed.magnitude();
                early += seed;
            }
        }

        if flags.use_learned_edges {
            if let Some(edges) = self.sources.edges.edge_overlay(goal_tags) {
                debug!("Edge overlay for {:?}: {:?}", goal_tags, edges);
                trace.edges += edges.magnitude();
                early += edges;
            }
        }

        if flags.use_user_personalisation {
            if let Some(personal) = self.sources.personal.personal_overlay(user_id, now) {
                debug!("Personal overlay for {}: {:?}", user_id, personal);
                trace.personal += personal.magnitude();
                early += personal;
            }
        }

        let mut micro = None;
        if flags.use_curriculum {
            micro = self.sources.curriculum.due_overlay(user_id, now);
        }
        if micro.is_none() && flags.use_practice {
            micro = self.sources.practice.due_overlay(user_id, now);
        }
        if let Some(m) = &micro {
            debug!("Micro-overlay {} for {}", m.label, user_id);
            trace.schedule += m.overlay.magnitude();
            early += m.overlay;
        }

        let mut total = early.clamped(self.config.early_cap);

        if let Some(shadow) = self.sources.shadow.shadow_overlay(user_id) {
            trace.shadow += shadow.magnitude();
            total += shadow;
        }

        if flags.use_model_planner {
            if let Some(plan) = self.sources.planner.planned_overlay(user_id, context, goal_tags) {
                debug!("Planner overlay for {}: {:?}", user_id, plan);
                trace.planner += plan.magnitude();
                total += plan;
            }
        }

        let bounded = self.trust_region(total).clamped(self.config.final_cap);
        let clipped = bounded.max_abs_diff(&total) > CLIP_EPSILON;
        if clipped {
            debug!("Overlay for {} clipped from {:?} to {:?}", user_id, total, bounded);
        }

        let hint = explain::resolve_hint(
            context.hint.as_deref(),
            goal_tags,
            micro.as_ref().and_then(|m| m.hint.as_deref()),
        );
        let explanation =
            explain::compose(hint.as_deref(), &trace, self.config.explanation_max_chars);

        OverlayResult {
            overlay: bounded,
            trace,
            clipped,
            explanation,
        }
    }

    /// Bound the normalized floral and body pressures independently
    ///
    /// Floral pressure is cooler, coarser, gentler; body pressure is the
    /// opposite. Only the components contributing to an over-budget
    /// pressure are scaled, so that pressure lands exactly on the budget.
    pub fn trust_region(&self, overlay: Overlay) -> Overlay {
        let cfg = &self.config;
        let t = overlay.temp_delta / cfg.temp_scale;
        let g = overlay.grind_delta / cfg.grind_scale;
        let a = overlay.agitation_delta / cfg.agitation_scale;

        let floral = (-t).max(0.0) + g.max(0.0) + (-a).max(0.0);
        let body = t.max(0.0) + (-g).max(0.0) + a.max(0.0);

        let factor = |pressure: f64| {
            if pressure > cfg.trust_budget {
                cfg.trust_budget / pressure
            } else {
                1.0
            }
        };
        let (floral_factor, body_factor) = (factor(floral), factor(body));

        let scale = |value: f64, floral_side: bool| {
            if value == 0.0 {
                value
            } else if floral_side {
                value * floral_factor
            } else {
                value * body_factor
            }
        };

        Overlay::new(
            scale(overlay.temp_delta, overlay.temp_delta < 0.0),
            scale(overlay.grind_delta, overlay.grind_delta > 0.0),
            scale(overlay.agitation_delta, overlay.agitation_delta < 0.0),
        )
    }
}
