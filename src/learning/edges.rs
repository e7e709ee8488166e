//! Global goal × variable association graph
//!
//! Each edge `goal::variable` carries a signed strength learned from every
//! live feedback event: positive sessions reinforce the variables the brewer
//! moved, negative sessions weaken them at half the rate. Scores are always
//! kept within `±score_clip`.

use super::sources::EdgeSource;
use crate::config::EdgeConfig;
use crate::error::Result;
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::{clip, schema_version, Overlay, VarKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Build the persisted key for an edge
pub fn edge_key(goal: &str, var: VarKey) -> String {
    format!("{}::{}", goal, var.as_str())
}

/// Split a persisted key back into goal and variable
pub fn parse_edge_key(key: &str) -> Option<(&str, VarKey)> {
    let (goal, var) = key.split_once("::")?;
    if goal.is_empty() {
        return None;
    }
    Some((goal, VarKey::parse(var)?))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeRecord {
    pub score: f64,
    pub pos: f64,
    pub neg: f64,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Persisted edge graph document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeGraph {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub edges: BTreeMap<String, EdgeRecord>,
}

impl Default for EdgeGraph {
    fn default() -> Self {
        Self {
            schema_version: schema_version(),
            edges: BTreeMap::new(),
        }
    }
}

/// Learner over the global edge graph
pub struct EdgeLearner {
    store: Arc<JsonStore>,
    config: EdgeConfig,
}

impl EdgeLearner {
    pub fn new(store: Arc<JsonStore>, config: EdgeConfig) -> Self {
        Self { store, config }
    }

    fn doc() -> DocPath {
        DocPath::global(paths::EDGES)
    }

    pub fn score_clip(&self) -> f64 {
        self.config.score_clip
    }

    /// Current graph (empty when missing or corrupt)
    pub fn snapshot(&self) -> EdgeGraph {
        self.store.read_or(&Self::doc(), EdgeGraph::default)
    }

    /// Locked read-modify-write over the whole graph
    pub fn modify<R>(&self, f: impl FnOnce(&mut EdgeGraph) -> R) -> Result<R> {
        self.store.update(&Self::doc(), EdgeGraph::default, |graph| {
            graph.schema_version = schema_version();
            f(graph)
        })
    }

    /// Fold one feedback event into every (tag × variable) edge
    pub fn register_feedback(
        &self,
        goal_tags: &[String],
        nudges: &Overlay,
        sentiment: f64,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if goal_tags.is_empty() {
            return Ok(0);
        }

        let s = clip(sentiment, 1.0);
        let cfg = &self.config;

        let touched = self.modify(|graph| {
            let mut touched = 0;
            for tag in goal_tags {
                for (var, nudge) in nudges.iter() {
                    let magnitude = if nudge.is_finite() { nudge.abs() } else { 0.0 };
                    let edge = graph.edges.entry(edge_key(tag, var)).or_default();
                    if s >= 0.0 {
                        edge.pos += magnitude * s;
                        edge.score += cfg.positive_rate * magnitude * s;
                    } else {
                        edge.neg += magnitude * s.abs();
                        edge.score -= cfg.negative_rate * magnitude * s.abs();
                    }
                    edge.score = clip(edge.score, cfg.score_clip);
                    edge.last_seen = Some(now);
                    touched += 1;
                }
            }
            touched
        })?;

        debug!("Edge learner updated {} edges (sentiment {:.2})", touched, s);
        Ok(touched)
    }

    /// Summed edge scores for the given goals, clamped to `±overlay_cap`
    pub fn overlays_for_goals(&self, goal_tags: &[String]) -> Option<Overlay> {
        if goal_tags.is_empty() {
            return None;
        }

        let graph = self.snapshot();
        let mut overlay = Overlay::ZERO;
        let mut matched = false;
        for (key, edge) in &graph.edges {
            let Some((goal, var)) = parse_edge_key(key) else {
                continue;
            };
            if goal_tags.iter().any(|t| t == goal) {
                overlay.set(var, overlay.get(var) + edge.score);
                matched = true;
            }
        }

        matched.then(|| overlay.clamped(self.config.overlay_cap))
    }

    /// Multiply every edge's score and evidence by `factor`
    pub fn decay_once(&self, factor: f64) -> Result<usize> {
        if !(factor > 0.0 && factor <= 1.0) {
            warn!("Ignoring decay factor {} outside (0, 1]", factor);
            return Ok(0);
        }
        let clip_at = self.config.score_clip;
        self.modify(|graph| {
            for edge in graph.edges.values_mut() {
                edge.score = clip(edge.score * factor, clip_at);
                edge.pos *= factor;
                edge.neg *= factor;
            }
            graph.edges.len()
        })
    }

    /// Add `delta` to one edge's score, creating it if needed
    pub fn nudge_edge(&self, goal: &str, var: VarKey, delta: f64, now: DateTime<Utc>) -> Result<f64> {
        let clip_at = self.config.score_clip;
        self.modify(|graph| {
            let edge = graph.edges.entry(edge_key(goal, var)).or_default();
            edge.score = clip(edge.score + delta, clip_at);
            edge.last_seen = Some(now);
            edge.score
        })
    }
}

impl EdgeSource for EdgeLearner {
    fn edge_overlay(&self, goal_tags: &[String]) -> Option<Overlay> {
        self.overlays_for_goals(goal_tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn learner() -> (TempDir, EdgeLearner) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::open(dir.path()).unwrap());
        (dir, EdgeLearner::new(store, EdgeConfig::default()))
    }

    fn tags(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_edge_key_round_trip() {
        let key = edge_key("body", VarKey::GrindDelta);
        assert_eq!(key, "body::grind_delta");
        assert_eq!(parse_edge_key(&key), Some(("body", VarKey::GrindDelta)));
        assert_eq!(parse_edge_key("body::bloom"), None);
        assert_eq!(parse_edge_key("nonsense"), None);
    }

    #[test]
    fn test_positive_feedback_learns_faster_than_negative() {
        let (_dir, learner) = learner();
        let now = Utc::now();
        let nudges = Overlay::new(0.2, 0.0, 0.0);

        learner.register_feedback(&tags(&["body"]), &nudges, 1.0, now).unwrap();
        let after_pos = learner.snapshot().edges["body::temp_delta"].score;
        assert!((after_pos - 0.024).abs() < 1e-9);

        learner.register_feedback(&tags(&["body"]), &nudges, -1.0, now).unwrap();
        let edge = &learner.snapshot().edges["body::temp_delta"];
        assert!((edge.score - 0.012).abs() < 1e-9);
        assert!((edge.pos - 0.2).abs() < 1e-9);
        assert!((edge.neg - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clipped() {
        let (_dir, learner) = learner();
        let nudges = Overlay::new(5.0, -5.0, 5.0);
        for _ in 0..50 {
            learner
                .register_feedback(&tags(&["clarity"]), &nudges, 1.0, Utc::now())
                .unwrap();
        }
        for edge in learner.snapshot().edges.values() {
            assert!(edge.score.abs() <= 0.75 + 1e-12);
        }
    }

    #[test]
    fn test_overlays_for_goals_sums_and_caps() {
        let (_dir, learner) = learner();
        let nudges = Overlay::new(0.2, 0.2, 0.2);
        for _ in 0..3 {
            learner
                .register_feedback(&tags(&["body", "round"]), &nudges, 1.0, Utc::now())
                .unwrap();
        }

        let overlay = learner.overlays_for_goals(&tags(&["body"])).unwrap();
        assert!(overlay.temp_delta > 0.0);
        assert!(overlay.agitation_delta > 0.0);

        let both = learner.overlays_for_goals(&tags(&["body", "round"])).unwrap();
        assert!((both.temp_delta - 2.0 * overlay.temp_delta).abs() < 1e-9);

        for _ in 0..200 {
            learner
                .register_feedback(&tags(&["body", "round"]), &nudges, 1.0, Utc::now())
                .unwrap();
        }
        let capped = learner.overlays_for_goals(&tags(&["body", "round"])).unwrap();
        assert!((capped.temp_delta - 0.25).abs() < 1e-9);

        assert!(learner.overlays_for_goals(&tags(&["floral"])).is_none());
        assert!(learner.overlays_for_goals(&[]).is_none());
    }

    #[test]
    fn test_decay_once() {
        let (_dir, learner) = learner();
        learner.nudge_edge("body", VarKey::TempDelta, 0.5, Utc::now()).unwrap();
        assert_eq!(learner.decay_once(0.9).unwrap(), 1);
        let score = learner.snapshot().edges["body::temp_delta"].score;
        assert!((score - 0.45).abs() < 1e-9);

        // Out-of-range factors are ignored
        assert_eq!(learner.decay_once(1.5).unwrap(), 0);
    }

    #[test]
    fn test_register_without_goals_is_noop() {
        let (_dir, learner) = learner();
        let n = learner
            .register_feedback(&[], &Overlay::new(0.2, 0.2, 0.2), 1.0, Utc::now())
            .unwrap();
        assert_eq!(n, 0);
        assert!(learner.snapshot().edges.is_empty());
    }
}
