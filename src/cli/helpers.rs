//! Shared helper functions for CLI commands
//!
//! Configuration resolution, engine construction and JSON output.

use anyhow::Context;
use brewlearn_core::{LearningConfig, LearningEngine};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load layered configuration; `--data-dir` wins over file and environment
pub fn load_config(config_path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<LearningConfig> {
    let mut config = LearningConfig::load(config_path).context("Failed to load configuration")?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    debug!("Using data directory {}", config.data_dir.display());
    Ok(config)
}

pub fn open_engine(config: LearningConfig) -> anyhow::Result<LearningEngine> {
    let data_dir = config.data_dir.clone();
    LearningEngine::new(config)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))
}

/// Pretty-print a value as JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read a file, or stdin when the path is `-`
pub fn read_input(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))
    }
}

/// Parse `true|false|on|off|unset`; `unset` clears the override
pub fn parse_flag_value(raw: &str) -> anyhow::Result<Option<bool>> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(Some(true)),
        "false" | "off" | "0" | "no" => Ok(Some(false)),
        "unset" | "default" | "none" => Ok(None),
        other => anyhow::bail!("Invalid flag value '{}': expected true, false or unset", other),
    }
}
