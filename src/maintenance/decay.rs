// Edge Decay Job
//
// Periodically shrinks every global edge so associations that stop being
// reinforced fade out and eventually fall under the prune threshold.

use super::config::JobConfig;
use super::scheduler::{run_blocking, JobError, JobReport, MaintenanceJob};
use crate::error::Result;
use crate::learning::edges::EdgeLearner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayReport {
    /// Number of edges decayed
    pub count: usize,
}

/// Multiply every edge's score and evidence by `factor`
pub fn decay(edges: &EdgeLearner, factor: f64) -> Result<DecayReport> {
    let count = edges.decay_once(factor)?;
    tracing::info!("Decayed {} edges by {}", count, factor);
    Ok(DecayReport { count })
}

pub struct DecayJob {
    edges: Arc<EdgeLearner>,
    factor: f64,
}

impl DecayJob {
    pub fn new(edges: Arc<EdgeLearner>, factor: f64) -> Self {
        Self { edges, factor }
    }
}

#[async_trait]
impl MaintenanceJob for DecayJob {
    fn name(&self) -> &str {
        "edge_decay"
    }

    async fn run(&self, _config: &JobConfig) -> std::result::Result<JobReport, JobError> {
        let edges = self.edges.clone();
        let factor = self.factor;
        run_blocking(move || {
            let started = Instant::now();
            let report = decay(&edges, factor).map_err(|e| JobError::Execution(e.to_string()))?;
            Ok(JobReport::completed(report.count, report.count, started))
        })
        .await
    }
}
