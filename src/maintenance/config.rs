// Maintenance Configuration
//
// Scheduling for the background maintenance jobs (edge decay, pruning,
// association discovery) plus the parameters each job runs with.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main maintenance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Enable/disable all scheduled maintenance
    pub enabled: bool,

    /// Edge decay job
    pub decay: JobConfig,

    /// Edge pruning job
    pub prune: JobConfig,

    /// Association discovery job
    pub discovery: JobConfig,

    /// Multiplier applied to every edge per decay run
    pub decay_factor: f64,

    /// Edges with |score| below this are dropped
    pub prune_threshold: f64,

    /// Edges kept per goal tag
    pub prune_top_n: usize,

    /// Session window scanned by discovery and offline evaluation
    pub window_days: u32,

    /// Minimum co-occurrences before a pair is proposed
    pub discovery_min_count: usize,
}

/// Configuration for an individual maintenance job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Enable/disable this specific job
    pub enabled: bool,

    /// Interval between job runs (in seconds)
    #[serde(with = "serde_duration")]
    pub interval: Duration,

    /// Maximum duration for job execution (in seconds)
    #[serde(with = "serde_duration")]
    pub max_duration: Duration,
}

impl JobConfig {
    pub fn every(interval_secs: u64) -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(interval_secs),
            max_duration: Duration::from_secs(300),
        }
    }
}

// Durations are serialized as whole seconds
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decay: JobConfig::every(86400),      // daily
            prune: JobConfig::every(604800),     // weekly
            discovery: JobConfig::every(604800), // weekly
            decay_factor: 0.995,
            prune_threshold: 0.02,
            prune_top_n: 20,
            window_days: 30,
            discovery_min_count: 6,
        }
    }
}

impl MaintenanceConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_job_config("decay", &self.decay)?;
        self.validate_job_config("prune", &self.prune)?;
        self.validate_job_config("discovery", &self.discovery)?;

        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(ConfigError::ValidationError(
                "decay_factor must be between 0 (exclusive) and 1".to_string(),
            ));
        }

        if !(self.prune_threshold.is_finite() && self.prune_threshold >= 0.0) {
            return Err(ConfigError::ValidationError(
                "prune_threshold must be a non-negative number".to_string(),
            ));
        }

        if self.prune_top_n == 0 {
            return Err(ConfigError::ValidationError(
                "prune_top_n must be at least 1".to_string(),
            ));
        }

        if self.window_days == 0 {
            return Err(ConfigError::ValidationError(
                "window_days must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_job_config(&self, name: &str, config: &JobConfig) -> Result<(), ConfigError> {
        if config.interval < Duration::from_secs(60) {
            return Err(ConfigError::ValidationError(format!(
                "{}: interval must be at least 1 minute",
                name
            )));
        }

        if config.max_duration < Duration::from_secs(1)
            || config.max_duration > Duration::from_secs(1800)
        {
            return Err(ConfigError::ValidationError(format!(
                "{}: max_duration must be between 1 second and 30 minutes",
                name
            )));
        }

        Ok(())
    }
}
