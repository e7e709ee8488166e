//! Layered configuration for the learning core
//!
//! Resolution order (later wins):
//! 1. Compiled defaults (the constants every learner was tuned with)
//! 2. Optional TOML file
//! 3. Environment variables prefixed `BREWLEARN_`, nested with `__`
//!    (e.g. `BREWLEARN_EVALUATOR__THRESHOLD=5`)
//!
//! `BREWLEARN_LEARNING_THRESHOLD` is honoured as a shorthand for the warmup
//! threshold.

use crate::error::{BrewError, Result};
use crate::maintenance::config::MaintenanceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "BREWLEARN";

/// Shorthand env var for the warmup threshold
pub const THRESHOLD_ENV: &str = "BREWLEARN_LEARNING_THRESHOLD";

/// Default data directory (`$XDG_DATA_HOME/brewlearn` or `./brewlearn`)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("brewlearn")
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Root directory for all persisted documents
    pub data_dir: PathBuf,
    pub evaluator: EvaluatorConfig,
    pub edges: EdgeConfig,
    pub personalizer: PersonalizerConfig,
    pub shadow: EmaConfig,
    pub cohort: CohortConfig,
    pub curriculum: CurriculumConfig,
    pub surrogate: EmaConfig,
    pub composer: ComposerConfig,
    pub maintenance: MaintenanceConfig,
}

/// Warmup gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Number of feedback events before learning goes live
    pub threshold: u32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { threshold: 3 }
    }
}

/// Global goal × variable edge learner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub positive_rate: f64,
    pub negative_rate: f64,
    pub score_clip: f64,
    pub overlay_cap: f64,
    pub decay_factor: f64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            positive_rate: 0.12,
            negative_rate: 0.06,
            score_clip: 0.75,
            overlay_cap: 0.25,
            decay_factor: 0.995,
        }
    }
}

/// Per-user trait/note preference settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizerConfig {
    pub alpha: f64,
    pub score_clip: f64,
    pub min_sessions: u32,
    pub half_life_days: f64,
}

impl Default for PersonalizerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.25,
            score_clip: 0.6,
            min_sessions: 3,
            half_life_days: 28.0,
        }
    }
}

/// Shared settings for the EMA-style trackers (shadow, surrogate)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmaConfig {
    pub alpha: f64,
    pub cap: f64,
}

impl Default for EmaConfig {
    fn default() -> Self {
        Self { alpha: 0.2, cap: 0.3 }
    }
}

/// Cohort seed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    pub alpha: f64,
    pub cap: f64,
    /// Cohort sessions required before a seed is exposed
    pub min_sessions: u32,
    /// Seed only applies while the user has fewer sessions than this
    pub cold_start_sessions: usize,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            cap: 0.3,
            min_sessions: 6,
            cold_start_sessions: 3,
        }
    }
}

/// Spaced-repetition scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    pub default_ease: f64,
    pub max_interval_days: u32,
    pub history_limit: usize,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            default_ease: 2.4,
            max_interval_days: 21,
            history_limit: 50,
        }
    }
}

/// Overlay composition and trust-region settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub early_cap: f64,
    pub final_cap: f64,
    /// Maximum normalized floral or body pressure
    pub trust_budget: f64,
    pub temp_scale: f64,
    pub grind_scale: f64,
    pub agitation_scale: f64,
    pub explanation_max_chars: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            early_cap: 0.3,
            final_cap: 0.3,
            trust_budget: 0.3,
            temp_scale: 0.3,
            grind_scale: 0.25,
            agitation_scale: 0.25,
            explanation_max_chars: 140,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            evaluator: EvaluatorConfig::default(),
            edges: EdgeConfig::default(),
            personalizer: PersonalizerConfig::default(),
            shadow: EmaConfig::default(),
            cohort: CohortConfig::default(),
            curriculum: CurriculumConfig::default(),
            surrogate: EmaConfig::default(),
            composer: ComposerConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

fn invalid(msg: String) -> BrewError {
    BrewError::Config(config::ConfigError::Message(msg))
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(format!("{}: must be between 0 (exclusive) and 1", name)));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(format!("{}: must be a positive number", name)));
    }
    Ok(())
}

impl LearningConfig {
    /// Defaults rooted at a specific data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load layered configuration: defaults, optional TOML file, environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            debug!("Loading configuration file: {}", path.display());
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: LearningConfig = builder.build()?.try_deserialize()?;

        if let Ok(raw) = std::env::var(THRESHOLD_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(threshold) => loaded.evaluator.threshold = threshold,
                Err(_) => {
                    return Err(invalid(format!(
                        "{}: expected a positive integer, got '{}'",
                        THRESHOLD_ENV, raw
                    )))
                }
            }
        }

        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration from a TOML string (no environment layering)
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: LearningConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).map_err(|e| invalid(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.evaluator.threshold == 0 {
            return Err(invalid("evaluator.threshold: must be at least 1".to_string()));
        }

        check_positive("edges.positive_rate", self.edges.positive_rate)?;
        check_positive("edges.negative_rate", self.edges.negative_rate)?;
        check_positive("edges.score_clip", self.edges.score_clip)?;
        check_positive("edges.overlay_cap", self.edges.overlay_cap)?;
        check_unit("edges.decay_factor", self.edges.decay_factor)?;

        check_unit("personalizer.alpha", self.personalizer.alpha)?;
        check_positive("personalizer.score_clip", self.personalizer.score_clip)?;
        check_positive("personalizer.half_life_days", self.personalizer.half_life_days)?;

        check_unit("shadow.alpha", self.shadow.alpha)?;
        check_positive("shadow.cap", self.shadow.cap)?;
        check_unit("cohort.alpha", self.cohort.alpha)?;
        check_positive("cohort.cap", self.cohort.cap)?;
        check_unit("surrogate.alpha", self.surrogate.alpha)?;
        check_positive("surrogate.cap", self.surrogate.cap)?;

        if self.curriculum.default_ease < 1.3 {
            return Err(invalid(
                "curriculum.default_ease: must be at least 1.3".to_string(),
            ));
        }
        if self.curriculum.max_interval_days == 0 {
            return Err(invalid(
                "curriculum.max_interval_days: must be at least 1".to_string(),
            ));
        }

        check_positive("composer.early_cap", self.composer.early_cap)?;
        check_positive("composer.final_cap", self.composer.final_cap)?;
        check_positive("composer.trust_budget", self.composer.trust_budget)?;
        check_positive("composer.temp_scale", self.composer.temp_scale)?;
        check_positive("composer.grind_scale", self.composer.grind_scale)?;
        check_positive("composer.agitation_scale", self.composer.agitation_scale)?;
        if self.composer.explanation_max_chars < 4 {
            return Err(invalid(
                "composer.explanation_max_chars: must be at least 4".to_string(),
            ));
        }

        self.maintenance
            .validate()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LearningConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.evaluator.threshold, 3);
        assert!((config.edges.score_clip - 0.75).abs() < 1e-9);
        assert!((config.composer.grind_scale - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_validate_zero_threshold() {
        let mut config = LearningConfig::default();
        config.evaluator.threshold = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must be at least 1"));
    }

    #[test]
    fn test_validate_alpha_out_of_range() {
        let mut config = LearningConfig::default();
        config.personalizer.alpha = 1.5;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must be between"));
    }

    #[test]
    fn test_validate_low_ease() {
        let mut config = LearningConfig::default();
        config.curriculum.default_ease = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml_str = r#"
            data_dir = "/tmp/brewlearn-test"

            [evaluator]
            threshold = 5

            [edges]
            score_clip = 0.5
        "#;

        let config = LearningConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.evaluator.threshold, 5);
        assert!((config.edges.score_clip - 0.5).abs() < 1e-9);
        // Unspecified values keep their defaults
        assert!((config.edges.positive_rate - 0.12).abs() < 1e-9);
        assert_eq!(config.personalizer.min_sessions, 3);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = LearningConfig::with_data_dir("/tmp/brew");
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: LearningConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.data_dir, deserialized.data_dir);
        assert_eq!(config.curriculum.max_interval_days, deserialized.curriculum.max_interval_days);
    }

    #[test]
    fn test_to_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("brewlearn.toml");

        let mut config = LearningConfig::with_data_dir(dir.path());
        config.evaluator.threshold = 4;
        config.to_file(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded = LearningConfig::from_toml(&contents).unwrap();
        assert_eq!(loaded.evaluator.threshold, 4);
    }
}
