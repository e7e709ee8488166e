//! Per-user progress tracking and global learning metrics
//!
//! Recorded on every newly stored feedback event, gated or not. Learning
//! gain compares the user's latest ratings with their first few. Alignment
//! counts sessions where a predicted note was confirmed, and calibration
//! counts free-text complaints about bitterness or sourness.
//!
//! Each record also refreshes `metrics/global.json`, the mean of the
//! per-user rates over every user with a progress document.

use crate::error::Result;
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::{schema_version, FeedbackEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

const WINDOW: usize = 5;
const RECENT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub user_id: String,
    #[serde(default)]
    pub samples: u32,
    /// First ratings ever given (up to five)
    #[serde(default)]
    pub first_ratings: Vec<f64>,
    /// Most recent ratings (up to fifty)
    #[serde(default)]
    pub recent_ratings: Vec<f64>,
    /// Sessions where a confirmed note had been predicted
    #[serde(default)]
    pub alignment_hits: u32,
    #[serde(default)]
    pub calib_bitter: u32,
    #[serde(default)]
    pub calib_sour: u32,
    /// Sessions considered for calibration (every recorded session)
    #[serde(default)]
    pub calib_total: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressState {
    fn fresh(user_id: &str) -> Self {
        Self {
            schema_version: schema_version(),
            user_id: user_id.to_string(),
            samples: 0,
            first_ratings: Vec::new(),
            recent_ratings: Vec::new(),
            alignment_hits: 0,
            calib_bitter: 0,
            calib_sour: 0,
            calib_total: 0,
            updated_at: None,
        }
    }

    fn first_mean(&self) -> Option<f64> {
        mean(&self.first_ratings)
    }

    fn last_mean(&self) -> Option<f64> {
        let tail_start = self.recent_ratings.len().saturating_sub(WINDOW);
        mean(&self.recent_ratings[tail_start..])
    }

    fn learning_gain(&self) -> Option<f64> {
        self.first_mean()
            .zip(self.last_mean())
            .map(|(first, last)| last - first)
    }

    fn alignment_rate(&self) -> f64 {
        f64::from(self.alignment_hits) / f64::from(self.samples.max(1))
    }

    fn calibration_hit(&self) -> f64 {
        f64::from(self.calib_bitter + self.calib_sour) / f64::from(self.calib_total.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub user_id: String,
    pub sessions: u32,
    pub first_mean: Option<f64>,
    pub last_mean: Option<f64>,
    /// `mean(last five) - mean(first five)`
    pub learning_gain: Option<f64>,
    pub alignment_hits: u32,
    /// `alignment_hits / sessions`
    pub alignment_rate: f64,
    pub calib_bitter: u32,
    pub calib_sour: u32,
    /// `(bitter + sour) / calibration sessions`
    pub calibration_hit: f64,
}

/// Cross-user aggregates, stored at `metrics/global.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalProgress {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub users: usize,
    #[serde(default)]
    pub alignment_rate: f64,
    /// Mean over users that have ratings
    #[serde(default)]
    pub learning_gain: f64,
    #[serde(default)]
    pub calibration_hit: f64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for GlobalProgress {
    fn default() -> Self {
        Self {
            schema_version: schema_version(),
            users: 0,
            alignment_rate: 0.0,
            learning_gain: 0.0,
            calibration_hit: 0.0,
            updated_at: None,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn normalize(note: &str) -> String {
    note.trim().to_lowercase()
}

/// Whether any confirmed note was among the predicted ones
fn aligned(predicted: &[String], confirmed: &[String]) -> bool {
    let predicted: HashSet<String> = predicted.iter().map(|n| normalize(n)).collect();
    confirmed
        .iter()
        .map(|n| normalize(n))
        .any(|n| !n.is_empty() && predicted.contains(&n))
}

pub struct ProgressTracker {
    store: Arc<JsonStore>,
}

impl ProgressTracker {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    fn doc(user_id: &str) -> Result<DocPath> {
        DocPath::scoped(paths::PROGRESS, user_id)
    }

    /// Fold one event into the user's progress, then refresh the global aggregates
    pub fn record(&self, event: &FeedbackEvent, now: DateTime<Utc>) -> Result<ProgressState> {
        let user_id = event.user_id.as_str();
        let hit = aligned(&event.predicted_notes, &event.notes_confirmed);
        let text = event.free_text.as_deref().unwrap_or_default().to_lowercase();
        let bitter = text.contains("bitter");
        let sour = text.contains("sour");

        let state = self.store.update(
            &Self::doc(user_id)?,
            || ProgressState::fresh(user_id),
            |state| {
                state.samples = state.samples.saturating_add(1);
                if let Some(rating) = event.rating_overall.filter(|r| r.is_finite()) {
                    if state.first_ratings.len() < WINDOW {
                        state.first_ratings.push(rating);
                    }
                    state.recent_ratings.push(rating);
                    if state.recent_ratings.len() > RECENT_LIMIT {
                        let excess = state.recent_ratings.len() - RECENT_LIMIT;
                        state.recent_ratings.drain(..excess);
                    }
                }
                state.alignment_hits += u32::from(hit);
                state.calib_bitter += u32::from(bitter);
                state.calib_sour += u32::from(sour);
                state.calib_total = state.calib_total.saturating_add(1);
                state.updated_at = Some(now);
                state.schema_version = schema_version();
                state.clone()
            },
        )?;

        self.refresh_global(now)?;
        Ok(state)
    }

    pub fn report(&self, user_id: &str) -> Result<ProgressReport> {
        let state = self
            .store
            .read_or(&Self::doc(user_id)?, || ProgressState::fresh(user_id));

        Ok(ProgressReport {
            first_mean: state.first_mean(),
            last_mean: state.last_mean(),
            learning_gain: state.learning_gain(),
            alignment_rate: state.alignment_rate(),
            calibration_hit: state.calibration_hit(),
            alignment_hits: state.alignment_hits,
            calib_bitter: state.calib_bitter,
            calib_sour: state.calib_sour,
            sessions: state.samples,
            user_id: state.user_id,
        })
    }

    /// Last stored global aggregates
    pub fn global(&self) -> GlobalProgress {
        self.store
            .read_or(&DocPath::global(paths::GLOBAL_PROGRESS), GlobalProgress::default)
    }

    /// Recompute the global aggregates from every user's progress document
    pub fn refresh_global(&self, now: DateTime<Utc>) -> Result<GlobalProgress> {
        let users: Vec<ProgressState> = self
            .store
            .list_dir(paths::PROGRESS)?
            .iter()
            .filter_map(|path| self.store.load_path(path))
            .collect();

        let alignment: Vec<f64> = users.iter().map(ProgressState::alignment_rate).collect();
        let gains: Vec<f64> = users.iter().filter_map(ProgressState::learning_gain).collect();
        let calibration: Vec<f64> = users.iter().map(ProgressState::calibration_hit).collect();

        let global = GlobalProgress {
            schema_version: schema_version(),
            users: users.len(),
            alignment_rate: mean(&alignment).unwrap_or(0.0),
            learning_gain: mean(&gains).unwrap_or(0.0),
            calibration_hit: mean(&calibration).unwrap_or(0.0),
            updated_at: Some(now),
        };
        self.store
            .write(&DocPath::global(paths::GLOBAL_PROGRESS), &global)?;

        debug!(
            "Global progress over {} users: alignment {:.2}, gain {:.2}",
            global.users, global.alignment_rate, global.learning_gain
        );
        Ok(global)
    }
}
