//! Warmup gate
//!
//! A per-scope counter that decides whether feedback updates the learners.
//! Modes only move forward: `OFF -> waiting(n/T) -> ON`. Once a scope is ON
//! it stays ON (even if the threshold is later raised) until `reset`.

use crate::error::{BrewError, Result};
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::schema_version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Learning mode for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LearningMode {
    Off,
    Waiting { seen: u32, threshold: u32 },
    On,
}

impl LearningMode {
    fn for_count(count: u32, threshold: u32, already_on: bool) -> Self {
        if already_on || count >= threshold {
            LearningMode::On
        } else if count == 0 {
            LearningMode::Off
        } else {
            LearningMode::Waiting {
                seen: count,
                threshold,
            }
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, LearningMode::On)
    }
}

impl std::fmt::Display for LearningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LearningMode::Off => write!(f, "OFF"),
            LearningMode::Waiting { seen, threshold } => write!(f, "waiting({}/{})", seen, threshold),
            LearningMode::On => write!(f, "ON"),
        }
    }
}

impl From<LearningMode> for String {
    fn from(mode: LearningMode) -> Self {
        mode.to_string()
    }
}

impl TryFrom<String> for LearningMode {
    type Error = BrewError;

    fn try_from(raw: String) -> Result<Self> {
        let trimmed = raw.trim();
        match trimmed {
            "OFF" => return Ok(LearningMode::Off),
            "ON" => return Ok(LearningMode::On),
            _ => {}
        }

        let inner = trimmed
            .strip_prefix("waiting")
            .map(str::trim)
            .and_then(|s| s.strip_prefix('('))
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| BrewError::MalformedInput(format!("unknown learning mode '{}'", raw)))?;

        let (seen, threshold): (u32, u32) = inner
            .split_once('/')
            .and_then(|(a, b)| Some((a.trim().parse().ok()?, b.trim().parse().ok()?)))
            .ok_or_else(|| BrewError::MalformedInput(format!("unknown learning mode '{}'", raw)))?;

        Ok(LearningMode::Waiting { seen, threshold })
    }
}

/// Persisted gate state for one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorState {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub scope: String,
    pub mode: LearningMode,
    pub count: u32,
    #[serde(default)]
    pub threshold: u32,
}

impl EvaluatorState {
    fn fresh(scope: &str, threshold: u32) -> Self {
        Self {
            schema_version: schema_version(),
            scope: scope.to_string(),
            mode: LearningMode::Off,
            count: 0,
            threshold,
        }
    }

    pub fn is_live(&self) -> bool {
        self.mode.is_on()
    }
}

/// Per-scope warmup state machine
pub struct Evaluator {
    store: Arc<JsonStore>,
    threshold: u32,
}

impl Evaluator {
    pub fn new(store: Arc<JsonStore>, threshold: u32) -> Self {
        Self {
            store,
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn doc(scope: &str) -> Result<DocPath> {
        DocPath::scoped(paths::EVALUATOR, scope)
    }

    /// Read-only snapshot
    pub fn state(&self, scope: &str) -> Result<EvaluatorState> {
        let doc = Self::doc(scope)?;
        let mut state = self
            .store
            .read_or(&doc, || EvaluatorState::fresh(scope, self.threshold));
        state.threshold = self.threshold;
        state.mode = LearningMode::for_count(state.count, self.threshold, state.mode.is_on());
        Ok(state)
    }

    /// Count one feedback event and advance the mode
    pub fn update_on_feedback(&self, scope: &str) -> Result<EvaluatorState> {
        let doc = Self::doc(scope)?;
        let threshold = self.threshold;
        let state = self.store.update(
            &doc,
            || EvaluatorState::fresh(scope, threshold),
            |state| {
                state.count = state.count.saturating_add(1);
                state.mode = LearningMode::for_count(state.count, threshold, state.mode.is_on());
                state.threshold = threshold;
                state.schema_version = schema_version();
                state.clone()
            },
        )?;

        debug!("Evaluator {}: {} (count {})", scope, state.mode, state.count);
        Ok(state)
    }

    /// Return a scope to OFF with a zero counter
    pub fn reset(&self, scope: &str) -> Result<EvaluatorState> {
        let doc = Self::doc(scope)?;
        let state = EvaluatorState::fresh(scope, self.threshold);
        self.store.write(&doc, &state)?;
        Ok(state)
    }
}
