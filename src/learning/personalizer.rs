//! Per-user taste profile
//!
//! Tracks how a user responds to flavour notes and goal traits. Scores are
//! EMA-updated from live feedback and decay toward zero with a fixed
//! half-life measured from the last update, applied every time a profile is
//! read.

use super::sources::PersonalSource;
use crate::config::PersonalizerConfig;
use crate::error::Result;
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::{clip, schema_version, Overlay};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Target for notes the brewer tasted but the score was not positive
const CONFIRMED_FLOOR: f64 = 0.1;
/// Target for notes the brewer expected but could not find
const MISSING_TARGET: f64 = -0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalProfile {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub user_id: String,
    #[serde(default)]
    pub note_sensitivity: BTreeMap<String, f64>,
    #[serde(default)]
    pub trait_response: BTreeMap<String, f64>,
    #[serde(default)]
    pub history_count: u32,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl PersonalProfile {
    pub fn empty(user_id: &str) -> Self {
        Self {
            schema_version: schema_version(),
            user_id: user_id.to_string(),
            note_sensitivity: BTreeMap::new(),
            trait_response: BTreeMap::new(),
            history_count: 0,
            last_seen: None,
        }
    }

    /// Scale every score by `0.5^(days_since_last_seen / half_life)`
    fn decay_to(&mut self, now: DateTime<Utc>, half_life_days: f64) {
        let Some(last_seen) = self.last_seen else {
            return;
        };
        let days = (now - last_seen).num_milliseconds() as f64 / 86_400_000.0;
        if days <= 0.0 {
            return;
        }
        let factor = 0.5_f64.powf(days / half_life_days);
        for v in self
            .note_sensitivity
            .values_mut()
            .chain(self.trait_response.values_mut())
        {
            *v *= factor;
        }
    }

    fn trait_score(&self, name: &str) -> f64 {
        self.trait_response.get(name).copied().unwrap_or(0.0)
    }
}

/// Top preferences, strongest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub liked_notes: Vec<(String, f64)>,
    pub disliked_notes: Vec<(String, f64)>,
    pub traits: Vec<(String, f64)>,
    pub history_count: u32,
}

fn ema(slot: &mut f64, target: f64, alpha: f64, limit: f64) {
    *slot = clip((1.0 - alpha) * *slot + alpha * target, limit);
}

fn normalize(label: &str) -> Option<String> {
    let label = label.trim().to_lowercase();
    (!label.is_empty()).then_some(label)
}

fn ranked(map: &BTreeMap<String, f64>, keep: impl Fn(f64) -> bool, top: usize) -> Vec<(String, f64)> {
    let mut items: Vec<(String, f64)> = map
        .iter()
        .filter(|(_, v)| keep(**v))
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    items.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then_with(|| a.0.cmp(&b.0)));
    items.truncate(top);
    items
}

pub struct Personalizer {
    store: Arc<JsonStore>,
    config: PersonalizerConfig,
}

impl Personalizer {
    pub fn new(store: Arc<JsonStore>, config: PersonalizerConfig) -> Self {
        Self { store, config }
    }

    fn doc(user_id: &str) -> Result<DocPath> {
        DocPath::scoped(paths::PROFILES, user_id)
    }

    /// Profile as of `now`, half-life decay applied
    pub fn load(&self, user_id: &str, now: DateTime<Utc>) -> Result<PersonalProfile> {
        let mut profile = self
            .store
            .read_or(&Self::doc(user_id)?, || PersonalProfile::empty(user_id));
        profile.decay_to(now, self.config.half_life_days);
        Ok(profile)
    }

    /// Fold one live feedback event into the profile
    pub fn update_from_feedback(
        &self,
        user_id: &str,
        notes_confirmed: &[String],
        notes_missing: &[String],
        goal_tags: &[String],
        sentiment: f64,
        now: DateTime<Utc>,
    ) -> Result<PersonalProfile> {
        let cfg = &self.config;
        let s = clip(sentiment, 1.0);

        let profile = self.store.update(
            &Self::doc(user_id)?,
            || PersonalProfile::empty(user_id),
            |profile| {
                profile.decay_to(now, cfg.half_life_days);

                for note in notes_confirmed.iter().filter_map(|n| normalize(n)) {
                    let slot = profile.note_sensitivity.entry(note).or_insert(0.0);
                    ema(slot, CONFIRMED_FLOOR.max(s), cfg.alpha, cfg.score_clip);
                }
                for note in notes_missing.iter().filter_map(|n| normalize(n)) {
                    let slot = profile.note_sensitivity.entry(note).or_insert(0.0);
                    ema(slot, MISSING_TARGET, cfg.alpha, cfg.score_clip);
                }
                for tag in goal_tags.iter().filter_map(|t| normalize(t)) {
                    let slot = profile.trait_response.entry(tag).or_insert(0.0);
                    ema(slot, s, cfg.alpha, cfg.score_clip);
                }

                profile.history_count = profile.history_count.saturating_add(1);
                profile.last_seen = Some(now);
                profile.schema_version = schema_version();
                profile.clone()
            },
        )?;

        debug!(
            "Personalizer updated {} (history {})",
            user_id, profile.history_count
        );
        Ok(profile)
    }

    /// Two-axis mapping from trait responses to recipe deltas
    pub fn overlays_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<Overlay>> {
        let profile = self.load(user_id, now)?;
        if profile.history_count < self.config.min_sessions {
            return Ok(None);
        }

        let mut overlay = Overlay::ZERO;

        let floral = profile.trait_score("floral");
        if floral > 0.0 {
            overlay.temp_delta -= (0.3 * floral).min(0.3);
            overlay.agitation_delta -= (0.1 * floral).min(0.1);
        }

        let mut body = profile.trait_score("body");
        if body == 0.0 {
            body = profile.trait_score("syrupy_body");
        }
        if body > 0.0 {
            overlay.grind_delta -= (0.3 * body).min(0.3);
            overlay.temp_delta += (0.2 * body).min(0.2);
        }

        let overlay = overlay.clamped(0.3);
        Ok((!overlay.is_zero()).then_some(overlay))
    }

    /// Strongest liked/disliked notes and traits
    pub fn preferences(&self, user_id: &str, now: DateTime<Utc>, top: usize) -> Result<Preferences> {
        let profile = self.load(user_id, now)?;

        Ok(Preferences {
            liked_notes: ranked(&profile.note_sensitivity, |v| v > 0.0, top),
            disliked_notes: ranked(&profile.note_sensitivity, |v| v < 0.0, top),
            traits: ranked(&profile.trait_response, |v| v != 0.0, top),
            history_count: profile.history_count,
        })
    }
}

impl PersonalSource for Personalizer {
    fn personal_overlay(&self, user_id: &str, now: DateTime<Utc>) -> Option<Overlay> {
        match self.overlays_for_user(user_id, now) {
            Ok(overlay) => overlay,
            Err(e) => {
                tracing::warn!("Personalizer unavailable for {}: {}", user_id, e);
                None
            }
        }
    }
}
