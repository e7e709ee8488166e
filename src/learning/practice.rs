//! Focus-based practice mode
//!
//! A lighter alternative to the curriculum: the user picks a focus and gets
//! a small fixed micro-adjustment toward it until practice is turned off.

use super::sources::{MicroOverlay, ScheduleSource};
use crate::error::Result;
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::{schema_version, Overlay};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const CLARITY_FOCUS: &[&str] = &["clarity", "floral", "citrus_acidity"];
const BODY_FOCUS: &[&str] = &["body", "syrupy_body"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeState {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub user_id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PracticeState {
    fn fresh(user_id: &str) -> Self {
        Self {
            schema_version: schema_version(),
            user_id: user_id.to_string(),
            enabled: false,
            focus: None,
            updated_at: None,
        }
    }
}

/// A named exploration variant for A/B comparisons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeVariant {
    pub name: String,
    pub overlay: Overlay,
}

/// Micro-adjustment for a focus, with its explanation hint
pub fn focus_adjustment(focus: &str) -> Option<(Overlay, &'static str)> {
    let focus = focus.trim().to_lowercase();
    if CLARITY_FOCUS.contains(&focus.as_str()) {
        Some((Overlay::new(-0.1, 0.0, -0.05), "clarity"))
    } else if BODY_FOCUS.contains(&focus.as_str()) {
        Some((Overlay::new(0.1, -0.05, 0.0), "body"))
    } else {
        None
    }
}

pub struct PracticeManager {
    store: Arc<JsonStore>,
}

impl PracticeManager {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    fn doc(user_id: &str) -> Result<DocPath> {
        DocPath::scoped(paths::PRACTICE, user_id)
    }

    pub fn state(&self, user_id: &str) -> Result<PracticeState> {
        Ok(self
            .store
            .read_or(&Self::doc(user_id)?, || PracticeState::fresh(user_id)))
    }

    pub fn set_focus(
        &self,
        user_id: &str,
        focus: Option<&str>,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<PracticeState> {
        let focus = focus
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty());
        let state = self.store.update(
            &Self::doc(user_id)?,
            || PracticeState::fresh(user_id),
            |state| {
                state.enabled = enabled;
                state.focus = focus;
                state.updated_at = Some(now);
                state.schema_version = schema_version();
                state.clone()
            },
        )?;
        info!(
            "Practice for {} {} (focus {:?})",
            user_id,
            if state.enabled { "enabled" } else { "disabled" },
            state.focus
        );
        Ok(state)
    }

    /// Micro-adjustment for the user's focus, if practice is on
    pub fn micro_adjustment(&self, user_id: &str) -> Result<Option<MicroOverlay>> {
        let state = self.state(user_id)?;
        if !state.enabled {
            return Ok(None);
        }
        Ok(state.focus.as_deref().and_then(|focus| {
            focus_adjustment(focus).map(|(overlay, hint)| MicroOverlay {
                label: format!("practice:{}", focus),
                overlay,
                hint: Some(hint.to_string()),
            })
        }))
    }

    /// Fixed exploration pair for side-by-side brews
    pub fn ab_variants() -> Vec<PracticeVariant> {
        vec![
            PracticeVariant {
                name: "Clarity+".to_string(),
                overlay: Overlay::new(-0.1, 0.05, -0.05),
            },
            PracticeVariant {
                name: "Body+".to_string(),
                overlay: Overlay::new(0.1, -0.05, 0.05),
            },
        ]
    }
}

impl ScheduleSource for PracticeManager {
    fn due_overlay(&self, user_id: &str, _now: DateTime<Utc>) -> Option<MicroOverlay> {
        self.micro_adjustment(user_id).unwrap_or_else(|e| {
            warn!("Practice state unavailable for {}: {}", user_id, e);
            None
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, PracticeManager) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::open(dir.path()).unwrap());
        (dir, PracticeManager::new(store))
    }

    #[test]
    fn test_focus_adjustments() {
        let (clarity, hint) = focus_adjustment("Floral").unwrap();
        assert_eq!(clarity, Overlay::new(-0.1, 0.0, -0.05));
        assert_eq!(hint, "clarity");

        let (body, _) = focus_adjustment("syrupy_body").unwrap();
        assert_eq!(body, Overlay::new(0.1, -0.05, 0.0));

        assert!(focus_adjustment("sweetness").is_none());
    }

    #[test]
    fn test_disabled_practice_yields_nothing() {
        let (_dir, practice) = manager();
        let now = Utc::now();
        assert!(practice.due_overlay("u1", now).is_none());

        practice.set_focus("u1", Some("clarity"), false, now).unwrap();
        assert!(practice.due_overlay("u1", now).is_none());

        practice.set_focus("u1", Some("clarity"), true, now).unwrap();
        let micro = practice.due_overlay("u1", now).unwrap();
        assert_eq!(micro.hint.as_deref(), Some("clarity"));
        assert_eq!(micro.label, "practice:clarity");
    }

    #[test]
    fn test_ab_variants_are_opposed() {
        let variants = PracticeManager::ab_variants();
        assert_eq!(variants.len(), 2);
        assert!(variants[0].overlay.temp_delta < 0.0);
        assert!(variants[1].overlay.temp_delta > 0.0);
    }
}
