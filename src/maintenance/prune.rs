// Edge Pruning Job
//
// Drops weak edges and keeps only the strongest few per goal tag, so the
// graph stays small and the edge overlay is driven by real associations.

use super::config::JobConfig;
use super::scheduler::{run_blocking, JobError, JobReport, MaintenanceJob};
use crate::error::Result;
use crate::learning::edges::{parse_edge_key, EdgeLearner};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Keys of every dropped edge, sorted
    pub removed: Vec<String>,
    /// Edges remaining
    pub kept: usize,
}

/// Drop edges with `|score| < threshold`, then keep the top `top_n` per goal
///
/// Ranking is by `|score|` descending with ties broken by key. Keys that do
/// not parse as `goal::variable` are bucketed under their full key.
pub fn prune(edges: &EdgeLearner, threshold: f64, top_n: usize) -> Result<PruneReport> {
    let report = edges.modify(|graph| {
        let mut buckets: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
        let mut removed = Vec::new();

        for (key, edge) in &graph.edges {
            let magnitude = if edge.score.is_finite() { edge.score.abs() } else { 0.0 };
            if magnitude < threshold {
                removed.push(key.clone());
                continue;
            }
            let goal = parse_edge_key(key)
                .map(|(goal, _)| goal.to_string())
                .unwrap_or_else(|| key.clone());
            buckets.entry(goal).or_default().push((key.clone(), magnitude));
        }

        for ranked in buckets.values_mut() {
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            removed.extend(ranked.iter().skip(top_n).map(|(key, _)| key.clone()));
        }

        for key in &removed {
            graph.edges.remove(key);
        }
        removed.sort();

        PruneReport {
            removed,
            kept: graph.edges.len(),
        }
    })?;

    tracing::info!(
        "Pruned {} edges (threshold {}, top {} per goal), {} kept",
        report.removed.len(),
        threshold,
        top_n,
        report.kept
    );
    Ok(report)
}

pub struct PruneJob {
    edges: Arc<EdgeLearner>,
    threshold: f64,
    top_n: usize,
}

impl PruneJob {
    pub fn new(edges: Arc<EdgeLearner>, threshold: f64, top_n: usize) -> Self {
        Self {
            edges,
            threshold,
            top_n,
        }
    }
}

#[async_trait]
impl MaintenanceJob for PruneJob {
    fn name(&self) -> &str {
        "edge_prune"
    }

    async fn run(&self, _config: &JobConfig) -> std::result::Result<JobReport, JobError> {
        let edges = self.edges.clone();
        let (threshold, top_n) = (self.threshold, self.top_n);
        run_blocking(move || {
            let started = Instant::now();
            let report = prune(&edges, threshold, top_n)
                .map_err(|e| JobError::Execution(e.to_string()))?;
            Ok(JobReport::completed(
                report.removed.len() + report.kept,
                report.removed.len(),
                started,
            ))
        })
        .await
    }
}
