//! Overlay source seams consumed by the composer
//!
//! Each source answers with `None` when it has nothing to contribute (cold
//! start, missing state, or an internal failure it has already logged), so
//! composition never fails because one learner did.

use crate::types::{BrewContext, Overlay};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Micro-overlay from the curriculum or practice mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroOverlay {
    /// Origin, e.g. `curriculum:clarity`
    pub label: String,
    pub overlay: Overlay,
    pub hint: Option<String>,
}

/// Global goal × variable associations
#[cfg_attr(test, mockall::automock)]
pub trait EdgeSource: Send + Sync {
    fn edge_overlay(&self, goal_tags: &[String]) -> Option<Overlay>;
}

/// Per-user trait preferences
#[cfg_attr(test, mockall::automock)]
pub trait PersonalSource: Send + Sync {
    fn personal_overlay(&self, user_id: &str, now: DateTime<Utc>) -> Option<Overlay>;
}

/// Always-on shadow model
#[cfg_attr(test, mockall::automock)]
pub trait DiagnosticSource: Send + Sync {
    fn shadow_overlay(&self, user_id: &str) -> Option<Overlay>;
}

/// Cold-start cohort seed
#[cfg_attr(test, mockall::automock)]
pub trait SeedSource: Send + Sync {
    fn cohort_seed(&self, context: &BrewContext, goal_tags: &[String]) -> Option<Overlay>;
}

/// Practice or curriculum micro-overlay
#[cfg_attr(test, mockall::automock)]
pub trait ScheduleSource: Send + Sync {
    fn due_overlay(&self, user_id: &str, now: DateTime<Utc>) -> Option<MicroOverlay>;
}

/// Model-based planner
#[cfg_attr(test, mockall::automock)]
pub trait PlannerSource: Send + Sync {
    fn planned_overlay(
        &self,
        user_id: &str,
        context: &BrewContext,
        goal_tags: &[String],
    ) -> Option<Overlay>;
}
