// Maintenance Scheduler
//
// Polls the registered jobs, runs each one whose interval has elapsed under
// its own timeout, and keeps a bounded in-memory log of runs.

use super::config::{JobConfig, MaintenanceConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

const HISTORY_LIMIT: usize = 200;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Execution(String),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("No schedule configured for job '{0}'")]
    UnknownJob(String),

    #[error("Job '{0}' is disabled")]
    Disabled(String),
}

/// What one job run looked at and changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Edges or sessions examined
    pub examined: usize,
    pub changed: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobReport {
    pub fn completed(examined: usize, changed: usize, started: Instant) -> Self {
        Self {
            examined,
            changed,
            elapsed_ms: started.elapsed().as_millis() as u64,
            error: None,
        }
    }

    fn failure(elapsed: Duration, error: &JobError) -> Self {
        Self {
            examined: 0,
            changed: 0,
            elapsed_ms: elapsed.as_millis() as u64,
            error: Some(error.to_string()),
        }
    }
}

/// Run a job's file-bound work on the blocking pool
///
/// Keeps flock waits and document I/O off the async workers, so the
/// scheduler's timeout can still fire. A timed-out task finishes in the
/// background; its result is dropped.
pub async fn run_blocking<F>(work: F) -> Result<JobReport, JobError>
where
    F: FnOnce() -> Result<JobReport, JobError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| JobError::Execution(format!("job task failed: {}", e)))?
}

#[async_trait]
pub trait MaintenanceJob: Send + Sync {
    /// Also the key its schedule is looked up by
    fn name(&self) -> &str;

    async fn run(&self, config: &JobConfig) -> Result<JobReport, JobError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: uuid::Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: JobStatus,
    pub report: JobReport,
}

pub struct BackgroundScheduler {
    config: MaintenanceConfig,
    jobs: Vec<Arc<dyn MaintenanceJob>>,
    running: AtomicBool,
    history: RwLock<VecDeque<JobRun>>,
    poll_interval: Duration,
}

impl BackgroundScheduler {
    pub fn new(config: MaintenanceConfig) -> Self {
        Self {
            config,
            jobs: Vec::new(),
            running: AtomicBool::new(false),
            history: RwLock::new(VecDeque::new()),
            poll_interval: Duration::from_secs(60),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn register_job(&mut self, job: Arc<dyn MaintenanceJob>) {
        tracing::debug!("Registered maintenance job {}", job.name());
        self.jobs.push(job);
    }

    /// Poll until [`stop`](Self::stop) is called
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        tracing::info!(
            "Maintenance scheduler started: {} jobs, polling every {:?}",
            self.jobs.len(),
            self.poll_interval
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        while self.is_running() {
            ticker.tick().await;
            if self.is_running() && self.config.enabled {
                self.run_due_jobs().await;
            }
        }

        tracing::info!("Maintenance scheduler stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn run_due_jobs(&self) -> Vec<JobRun> {
        let mut runs = Vec::new();
        for job in &self.jobs {
            let config = match self.schedule_for(job.name()) {
                Ok(config) => config,
                Err(e) => {
                    tracing::debug!("Skipping {}", e);
                    continue;
                }
            };
            if self.last_started(job.name()).await.is_some_and(|at| {
                let interval = chrono::Duration::from_std(config.interval)
                    .unwrap_or_else(|_| chrono::Duration::days(1));
                Utc::now() - at < interval
            }) {
                continue;
            }
            runs.push(self.run_job(job.as_ref(), config).await);
        }
        runs
    }

    /// Run one job under `config.max_duration` and log the outcome
    pub async fn run_job(&self, job: &dyn MaintenanceJob, config: &JobConfig) -> JobRun {
        let started_at = Utc::now();
        let clock = Instant::now();

        let outcome = match tokio::time::timeout(config.max_duration, job.run(config)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::TimedOut(config.max_duration)),
        };

        let (status, report) = match outcome {
            Ok(report) => {
                tracing::info!(
                    "{}: {} of {} changed in {}ms",
                    job.name(),
                    report.changed,
                    report.examined,
                    report.elapsed_ms
                );
                (JobStatus::Success, report)
            }
            Err(e) => {
                tracing::error!("{} failed: {}", job.name(), e);
                let status = match e {
                    JobError::TimedOut(_) => JobStatus::TimedOut,
                    JobError::Execution(_) => JobStatus::Failed,
                };
                (status, JobReport::failure(clock.elapsed(), &e))
            }
        };

        let run = JobRun {
            id: uuid::Uuid::new_v4(),
            job_name: job.name().to_string(),
            started_at,
            finished_at: Utc::now(),
            status,
            report,
        };

        let mut history = self.history.write().await;
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(run.clone());
        run
    }

    fn schedule_for(&self, job_name: &str) -> Result<&JobConfig, SchedulerError> {
        let config = match job_name {
            "edge_decay" => &self.config.decay,
            "edge_prune" => &self.config.prune,
            "discovery" => &self.config.discovery,
            other => return Err(SchedulerError::UnknownJob(other.to_string())),
        };
        if config.enabled {
            Ok(config)
        } else {
            Err(SchedulerError::Disabled(job_name.to_string()))
        }
    }

    async fn last_started(&self, job_name: &str) -> Option<DateTime<Utc>> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .find(|run| run.job_name == job_name)
            .map(|run| run.started_at)
    }

    /// Newest first, optionally filtered to one job
    pub async fn get_job_history(&self, job_name: Option<&str>, limit: usize) -> Vec<JobRun> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .filter(|run| job_name.map_or(true, |name| run.job_name == name))
            .take(limit)
            .cloned()
            .collect()
    }
}
