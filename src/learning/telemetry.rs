//! Clip telemetry and watchdog
//!
//! Every composition records whether the trust region or final clamp had to
//! cut the overlay. A rising clip rate means sources increasingly disagree
//! or overshoot.

use crate::error::Result;
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::schema_version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const WARN_RATE: f64 = 0.2;
const ALERT_RATE: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipCounter {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub clipped: u64,
}

impl Default for ClipCounter {
    fn default() -> Self {
        Self {
            schema_version: schema_version(),
            total: 0,
            clipped: 0,
        }
    }
}

impl ClipCounter {
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.clipped as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogStatus {
    Ok,
    Warn,
    Alert,
}

impl WatchdogStatus {
    pub fn classify(rate: f64) -> Self {
        if rate < WARN_RATE {
            WatchdogStatus::Ok
        } else if rate < ALERT_RATE {
            WatchdogStatus::Warn
        } else {
            WatchdogStatus::Alert
        }
    }
}

impl std::fmt::Display for WatchdogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogStatus::Ok => write!(f, "ok"),
            WatchdogStatus::Warn => write!(f, "warn"),
            WatchdogStatus::Alert => write!(f, "alert"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogReport {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub status: WatchdogStatus,
    pub clip_rate: f64,
    pub total: u64,
    pub clipped: u64,
    /// Number of watchdog checks so far
    pub seen: u64,
    pub checked_at: DateTime<Utc>,
}

pub struct ClipTelemetry {
    store: Arc<JsonStore>,
}

impl ClipTelemetry {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    pub fn record(&self, clipped: bool) -> Result<ClipCounter> {
        self.store.update(
            &DocPath::global(paths::CLIP_METRICS),
            ClipCounter::default,
            |counter| {
                counter.total = counter.total.saturating_add(1);
                if clipped {
                    counter.clipped = counter.clipped.saturating_add(1);
                }
                counter.clone()
            },
        )
    }

    pub fn counters(&self) -> ClipCounter {
        self.store
            .read_or(&DocPath::global(paths::CLIP_METRICS), ClipCounter::default)
    }

    /// Evaluate the clip rate and persist the snapshot
    pub fn watchdog(&self, now: DateTime<Utc>) -> Result<WatchdogReport> {
        let counter = self.counters();
        let rate = counter.rate();
        let status = WatchdogStatus::classify(rate);

        let report = self.store.update(
            &DocPath::global(paths::WATCHDOG),
            || WatchdogReport {
                schema_version: schema_version(),
                status,
                clip_rate: rate,
                total: 0,
                clipped: 0,
                seen: 0,
                checked_at: now,
            },
            |report| {
                report.schema_version = schema_version();
                report.status = status;
                report.clip_rate = rate;
                report.total = counter.total;
                report.clipped = counter.clipped;
                report.seen = report.seen.saturating_add(1);
                report.checked_at = now;
                report.clone()
            },
        )?;

        if status != WatchdogStatus::Ok {
            warn!(
                "Clip rate {:.1}% is {} ({} of {} compositions clipped)",
                rate * 100.0,
                status,
                counter.clipped,
                counter.total
            );
        }
        Ok(report)
    }
}
