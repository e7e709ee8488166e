//! Per-user linear surrogate planner
//!
//! A five-weight additive model relating what was brewed (and what the user
//! was aiming for) to how much they liked it. The weights on the three
//! recipe variables double as the directional deltas the planner proposes.

use super::features::{agitation_delta, leans_body, leans_clarity, GrindFamily, BASELINE_TEMP_C};
use super::sources::PlannerSource;
use crate::config::EmaConfig;
use crate::error::Result;
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::{clip, schema_version, BrewContext, Overlay, ProtocolSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Neutral rating; outcomes are centered on it
const NEUTRAL_RATING: f64 = 3.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SurrogateFeatures {
    pub temp_delta: f64,
    pub grind_delta: f64,
    pub agitation_delta: f64,
    pub hint_clarity: f64,
    pub hint_body: f64,
}

impl SurrogateFeatures {
    pub fn values(&self) -> [(&'static str, f64); 5] {
        [
            ("temp_delta", self.temp_delta),
            ("grind_delta", self.grind_delta),
            ("agitation_delta", self.agitation_delta),
            ("hint_clarity", self.hint_clarity),
            ("hint_body", self.hint_body),
        ]
    }
}

/// Feature vector for a protocol and goal set
pub fn featurize(protocol: &ProtocolSummary, goal_tags: &[String]) -> SurrogateFeatures {
    let temp = protocol.temperature_c.unwrap_or(BASELINE_TEMP_C);
    let flag = |on: bool| if on { 1.0 } else { 0.0 };
    SurrogateFeatures {
        temp_delta: (temp - BASELINE_TEMP_C) / 10.0,
        grind_delta: GrindFamily::classify(protocol.grind_label.as_deref()).delta(),
        agitation_delta: agitation_delta(protocol.agitation_overall.as_deref()),
        hint_clarity: flag(leans_clarity(goal_tags)),
        hint_body: flag(leans_body(goal_tags)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateState {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub user_id: String,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub n: u32,
}

impl SurrogateState {
    fn fresh(user_id: &str) -> Self {
        Self {
            schema_version: schema_version(),
            user_id: user_id.to_string(),
            weights: BTreeMap::new(),
            n: 0,
        }
    }

    fn weight(&self, name: &str) -> f64 {
        self.weights.get(name).copied().unwrap_or(0.0)
    }

    /// Predicted rating offset for a feature vector
    pub fn predict(&self, features: &SurrogateFeatures) -> f64 {
        features
            .values()
            .iter()
            .map(|(name, x)| self.weight(name) * x)
            .sum()
    }
}

pub struct SurrogatePlanner {
    store: Arc<JsonStore>,
    config: EmaConfig,
}

impl SurrogatePlanner {
    pub fn new(store: Arc<JsonStore>, config: EmaConfig) -> Self {
        Self { store, config }
    }

    fn doc(user_id: &str) -> Result<DocPath> {
        DocPath::scoped(paths::SURROGATE, user_id)
    }

    pub fn state(&self, user_id: &str) -> Result<Option<SurrogateState>> {
        Ok(self.store.load(&Self::doc(user_id)?))
    }

    /// `w <- clip((1 - a) w + a (overall - 3) x, cap)`
    pub fn update(
        &self,
        user_id: &str,
        features: &SurrogateFeatures,
        overall: Option<f64>,
    ) -> Result<SurrogateState> {
        let target = overall.filter(|r| r.is_finite()).unwrap_or(NEUTRAL_RATING) - NEUTRAL_RATING;
        let (alpha, cap) = (self.config.alpha, self.config.cap);

        self.store.update(
            &Self::doc(user_id)?,
            || SurrogateState::fresh(user_id),
            |state| {
                for (name, x) in features.values() {
                    let w = state.weights.entry(name.to_string()).or_insert(0.0);
                    *w = clip((1.0 - alpha) * *w + alpha * target * x, cap);
                }
                state.n = state.n.saturating_add(1);
                state.schema_version = schema_version();
                state.clone()
            },
        )
    }

    /// Proposed deltas for the baseline recipe; `None` without a model
    pub fn plan(
        &self,
        user_id: &str,
        _context: &BrewContext,
        goal_tags: &[String],
    ) -> Result<Option<Overlay>> {
        let Some(state) = self.state(user_id)? else {
            return Ok(None);
        };

        let baseline = featurize(&ProtocolSummary::baseline(), goal_tags);
        debug!(
            "Surrogate for {} predicts {:+.3} at baseline",
            user_id,
            state.predict(&baseline)
        );

        let overlay = Overlay::new(
            state.weight("temp_delta"),
            state.weight("grind_delta"),
            state.weight("agitation_delta"),
        )
        .clamped(self.config.cap);
        Ok((!overlay.is_zero()).then_some(overlay))
    }
}

impl PlannerSource for SurrogatePlanner {
    fn planned_overlay(&self, user_id: &str, context: &BrewContext, goal_tags: &[String]) -> Option<Overlay> {
        self.plan(user_id, context, goal_tags).unwrap_or_else(|e| {
            warn!("Surrogate planner unavailable for {}: {}", user_id, e);
            None
        })
    }
}
