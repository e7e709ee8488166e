//! Skill curriculum with SM-2-lite spacing
//!
//! Five fixed brewing skills, each scheduled independently:
//! - Review quality `q`: 5 on success, else 3 with confidence >= 2, else 2
//! - `q < 3` resets repetitions and interval to one day
//! - Otherwise the interval grows 1 -> 3 -> round(interval * ease), capped
//! - Ease moves by `0.1 - (5 - q)(0.08 + (5 - q) * 0.02)`, floored at 1.3
//!
//! `next_task` picks and activates a skill; `peek_due` is the read-only
//! view the overlay composer uses.

use super::sources::{MicroOverlay, ScheduleSource};
use crate::config::CurriculumConfig;
use crate::error::{BrewError, Result};
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::{schema_version, Overlay};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const MIN_EASE: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Clarity,
    Body,
    AcidityControl,
    BitternessControl,
    Texture,
}

impl Skill {
    pub const ALL: [Skill; 5] = [
        Skill::Clarity,
        Skill::Body,
        Skill::AcidityControl,
        Skill::BitternessControl,
        Skill::Texture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Skill::Clarity => "clarity",
            Skill::Body => "body",
            Skill::AcidityControl => "acidity_control",
            Skill::BitternessControl => "bitterness_control",
            Skill::Texture => "texture",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Skill::ALL.into_iter().find(|k| k.as_str() == s.trim())
    }

    /// Micro-overlay practiced with this skill
    pub fn overlay(&self) -> Overlay {
        match self {
            Skill::Clarity => Overlay::new(-0.2, 0.0, -0.1),
            Skill::Body => Overlay::new(0.2, 0.0, 0.1),
            Skill::AcidityControl => Overlay::new(0.2, 0.0, 0.05),
            Skill::BitternessControl => Overlay::new(-0.2, 0.0, -0.05),
            Skill::Texture => Overlay::new(0.0, 0.1, 0.0),
        }
    }

    pub fn coaching(&self) -> &'static str {
        match self {
            Skill::Clarity => "Drop the kettle a couple of degrees and pour gently; taste for separation.",
            Skill::Body => "Go a little hotter with a firmer swirl; notice weight on the tongue.",
            Skill::AcidityControl => "Nudge the temperature up to round off sharp acidity.",
            Skill::BitternessControl => "Cool the water slightly and calm the pours to tame bitterness.",
            Skill::Texture => "Open the grind a step and compare mouthfeel against your last cup.",
        }
    }

    /// Goal hint used for explanations
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Skill::Clarity | Skill::BitternessControl => Some("clarity"),
            Skill::Body | Skill::AcidityControl => Some("body"),
            Skill::Texture => None,
        }
    }
}

impl std::fmt::Display for Skill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillItem {
    pub ease: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub due: DateTime<Utc>,
    #[serde(default)]
    pub last_quality: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub skill: Skill,
    pub quality: u8,
    pub ease: f64,
    pub interval_days: u32,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumState {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub user_id: String,
    #[serde(default)]
    pub items: BTreeMap<Skill, SkillItem>,
    #[serde(default)]
    pub active: Option<Skill>,
    #[serde(default)]
    pub history: Vec<ReviewEntry>,
}

impl CurriculumState {
    fn fresh(user_id: &str) -> Self {
        Self {
            schema_version: schema_version(),
            user_id: user_id.to_string(),
            items: BTreeMap::new(),
            active: None,
            history: Vec::new(),
        }
    }

    /// Add any missing skills, due immediately; repair sub-floor ease
    fn ensure_items(&mut self, now: DateTime<Utc>, default_ease: f64) {
        for skill in Skill::ALL {
            let item = self.items.entry(skill).or_insert_with(|| SkillItem {
                ease: default_ease,
                interval_days: 1,
                repetitions: 0,
                due: now,
                last_quality: None,
            });
            if !(item.ease >= MIN_EASE) {
                item.ease = MIN_EASE;
            }
        }
    }

    fn earliest_due(&self, now: DateTime<Utc>) -> Option<Skill> {
        self.items
            .iter()
            .filter(|(_, item)| item.due <= now)
            .min_by(|a, b| a.1.due.cmp(&b.1.due).then_with(|| a.0.cmp(b.0)))
            .map(|(skill, _)| *skill)
    }

    fn least_practiced(&self) -> Option<Skill> {
        self.items
            .iter()
            .min_by(|a, b| {
                a.1.repetitions
                    .cmp(&b.1.repetitions)
                    .then_with(|| a.1.due.cmp(&b.1.due))
                    .then_with(|| a.0.cmp(b.0))
            })
            .map(|(skill, _)| *skill)
    }
}

/// A practice assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeTask {
    pub skill: Skill,
    pub overlay: Overlay,
    pub coaching: String,
    pub hint: Option<String>,
    pub due: DateTime<Utc>,
    pub interval_days: u32,
    pub ease: f64,
}

impl PracticeTask {
    fn from_item(skill: Skill, item: &SkillItem) -> Self {
        Self {
            skill,
            overlay: skill.overlay(),
            coaching: skill.coaching().to_string(),
            hint: skill.hint().map(str::to_string),
            due: item.due,
            interval_days: item.interval_days,
            ease: item.ease,
        }
    }
}

/// Result of a completed review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub skill: Skill,
    pub quality: u8,
    pub ease: f64,
    pub repetitions: u32,
    pub interval_days: u32,
    pub due: DateTime<Utc>,
}

/// Map a review to SM-2 quality
pub fn review_quality(success: bool, confidence: u8) -> u8 {
    if success {
        5
    } else if confidence >= 2 {
        3
    } else {
        2
    }
}

/// Ease after a review of quality `q`
pub fn next_ease(ease: f64, quality: u8) -> f64 {
    let miss = 5.0 - f64::from(quality.min(5));
    (ease + 0.1 - miss * (0.08 + miss * 0.02)).max(MIN_EASE)
}

pub struct Curriculum {
    store: Arc<JsonStore>,
    config: CurriculumConfig,
}

impl Curriculum {
    pub fn new(store: Arc<JsonStore>, config: CurriculumConfig) -> Self {
        Self { store, config }
    }

    fn doc(user_id: &str) -> Result<DocPath> {
        DocPath::scoped(paths::CURRICULUM, user_id)
    }

    /// Full scheduler state (not persisted by this call)
    pub fn status(&self, user_id: &str, now: DateTime<Utc>) -> Result<CurriculumState> {
        let mut state = self
            .store
            .read_or(&Self::doc(user_id)?, || CurriculumState::fresh(user_id));
        state.ensure_items(now, self.config.default_ease);
        Ok(state)
    }

    /// Earliest-due skill, else the least practiced one; marks it active
    pub fn next_task(&self, user_id: &str, now: DateTime<Utc>) -> Result<PracticeTask> {
        let default_ease = self.config.default_ease;
        self.store.try_update(
            &Self::doc(user_id)?,
            || CurriculumState::fresh(user_id),
            |state| {
                state.ensure_items(now, default_ease);
                let skill = state
                    .earliest_due(now)
                    .or_else(|| state.least_practiced())
                    .ok_or_else(|| BrewError::Other("curriculum has no skills".to_string()))?;
                state.active = Some(skill);
                state.schema_version = schema_version();
                let item = &state.items[&skill];
                Ok(PracticeTask::from_item(skill, item))
            },
        )
    }

    /// Active skill if any, else the earliest-due skill; never mutates
    pub fn peek_due(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<PracticeTask>> {
        let Some(mut state) = self.store.load::<CurriculumState>(&Self::doc(user_id)?) else {
            return Ok(None);
        };
        state.ensure_items(now, self.config.default_ease);

        let skill = state.active.or_else(|| state.earliest_due(now));
        Ok(skill.map(|skill| PracticeTask::from_item(skill, &state.items[&skill])))
    }

    /// Record a review for `skill` (or the active skill)
    pub fn review(
        &self,
        user_id: &str,
        skill: Option<Skill>,
        success: bool,
        confidence: u8,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome> {
        let cfg = self.config.clone();
        let outcome = self.store.try_update(
            &Self::doc(user_id)?,
            || CurriculumState::fresh(user_id),
            |state| {
                state.ensure_items(now, cfg.default_ease);
                let skill = skill.or(state.active).ok_or_else(|| {
                    BrewError::MalformedInput("no skill given and no active skill".to_string())
                })?;

                let quality = review_quality(success, confidence);
                let item = state
                    .items
                    .get_mut(&skill)
                    .ok_or_else(|| BrewError::Other(format!("missing skill {}", skill)))?;

                item.ease = next_ease(item.ease, quality);
                if quality < 3 {
                    item.repetitions = 0;
                    item.interval_days = 1;
                } else {
                    item.repetitions = item.repetitions.saturating_add(1);
                    let grown = match item.repetitions {
                        1 => 1,
                        2 => 3,
                        _ => (f64::from(item.interval_days) * item.ease).round() as u32,
                    };
                    item.interval_days = grown.clamp(1, cfg.max_interval_days.max(1));
                }
                item.due = now + Duration::days(i64::from(item.interval_days));
                item.last_quality = Some(quality);

                let outcome = ReviewOutcome {
                    skill,
                    quality,
                    ease: item.ease,
                    repetitions: item.repetitions,
                    interval_days: item.interval_days,
                    due: item.due,
                };

                state.history.push(ReviewEntry {
                    skill,
                    quality,
                    ease: outcome.ease,
                    interval_days: outcome.interval_days,
                    at: now,
                });
                if state.history.len() > cfg.history_limit {
                    let excess = state.history.len() - cfg.history_limit;
                    state.history.drain(..excess);
                }
                if state.active == Some(skill) {
                    state.active = None;
                }
                state.schema_version = schema_version();
                Ok(outcome)
            },
        )?;

        info!(
            "Curriculum review for {}: {} q={} next in {}d",
            user_id, outcome.skill, outcome.quality, outcome.interval_days
        );
        Ok(outcome)
    }
}

impl ScheduleSource for Curriculum {
    fn due_overlay(&self, user_id: &str, now: DateTime<Utc>) -> Option<MicroOverlay> {
        match self.peek_due(user_id, now) {
            Ok(task) => task.map(|t| MicroOverlay {
                label: format!("curriculum:{}", t.skill),
                overlay: t.overlay,
                hint: t.hint,
            }),
            Err(e) => {
                warn!("Curriculum unavailable for {}: {}", user_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn curriculum() -> (TempDir, Curriculum) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::open(dir.path()).unwrap());
        (dir, Curriculum::new(store, CurriculumConfig::default()))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_quality_mapping() {
        assert_eq!(review_quality(true, 0), 5);
        assert_eq!(review_quality(false, 2), 3);
        assert_eq!(review_quality(false, 1), 2);
    }

    #[test]
    fn test_ease_update() {
        assert!((next_ease(2.4, 5) - 2.5).abs() < 1e-9);
        assert!((next_ease(2.4, 3) - 2.26).abs() < 1e-9);
        assert!((next_ease(1.35, 2) - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_next_task_activates_and_peek_is_read_only() {
        let (_dir, c) = curriculum();
        assert!(c.peek_due("u1", t0()).unwrap().is_none());

        let task = c.next_task("u1", t0()).unwrap();
        assert_eq!(task.skill, Skill::Clarity);
        assert_eq!(c.status("u1", t0()).unwrap().active, Some(Skill::Clarity));

        let before = std::fs::read_to_string(
            c.store.resolve(&Curriculum::doc("u1").unwrap()),
        )
        .unwrap();
        let peeked = c.peek_due("u1", t0() + Duration::days(3)).unwrap().unwrap();
        assert_eq!(peeked.skill, Skill::Clarity);
        let after = std::fs::read_to_string(
            c.store.resolve(&Curriculum::doc("u1").unwrap()),
        )
        .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_failed_review_resets() {
        let (_dir, c) = curriculum();
        c.next_task("u1", t0()).unwrap();
        c.review("u1", None, true, 3, t0()).unwrap();
        c.review("u1", Some(Skill::Clarity), true, 3, t0()).unwrap();

        let failed = c.review("u1", Some(Skill::Clarity), false, 0, t0()).unwrap();
        assert_eq!(failed.repetitions, 0);
        assert_eq!(failed.interval_days, 1);
        assert_eq!(failed.due, t0() + Duration::days(1));
    }

    #[test]
    fn test_successes_never_shrink_interval() {
        let (_dir, c) = curriculum();
        let mut now = t0();
        let mut last = 0;
        for _ in 0..8 {
            let outcome = c.review("u1", Some(Skill::Body), true, 3, now).unwrap();
            assert!(outcome.interval_days >= last);
            assert!(outcome.interval_days <= 21);
            last = outcome.interval_days;
            now = outcome.due;
        }
        assert_eq!(last, 21);
    }

    #[test]
    fn test_interval_sequence() {
        let (_dir, c) = curriculum();
        let a = c.review("u1", Some(Skill::Texture), true, 3, t0()).unwrap();
        let b = c.review("u1", Some(Skill::Texture), true, 3, t0()).unwrap();
        let d = c.review("u1", Some(Skill::Texture), true, 3, t0()).unwrap();
        assert_eq!((a.interval_days, b.interval_days), (1, 3));
        // round(3 * 2.7)
        assert_eq!(d.interval_days, 8);
    }

    #[test]
    fn test_review_without_skill_is_malformed() {
        let (_dir, c) = curriculum();
        let err = c.review("u1", None, true, 3, t0()).unwrap_err();
        assert!(matches!(err, BrewError::MalformedInput(_)));
    }

    #[test]
    fn test_history_is_bounded() {
        let (_dir, c) = curriculum();
        for _ in 0..60 {
            c.review("u1", Some(Skill::Clarity), false, 3, t0()).unwrap();
        }
        assert_eq!(c.status("u1", t0()).unwrap().history.len(), 50);
    }

    #[test]
    fn test_next_task_prefers_due_over_least_practiced() {
        let (_dir, c) = curriculum();
        for skill in Skill::ALL {
            c.review("u1", Some(skill), true, 3, t0()).unwrap();
        }
        // Everything is due tomorrow; at +1 day clarity comes first by order
        let task = c.next_task("u1", t0() + Duration::days(1)).unwrap();
        assert_eq!(task.skill, Skill::Clarity);

        // Nothing due yet: falls back to least practiced
        c.review("u1", Some(Skill::Clarity), true, 3, t0()).unwrap();
        let task = c.next_task("u1", t0()).unwrap();
        assert_ne!(task.skill, Skill::Clarity);
    }
}
