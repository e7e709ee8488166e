//! Feature derivation from raw feedback
//!
//! Pure functions only. Turns a [`FeedbackPayload`] into goal tags, a
//! sentiment in `[-1, 1]` and per-variable nudges describing what the brewer
//! actually did relative to the neutral baseline. Malformed or missing
//! fields fall back to neutral values; only missing identity is rejected.

use crate::error::{BrewError, Result};
use crate::types::{
    clip, FeedbackEvent, FeedbackPayload, GoalItem, Overlay, ProtocolSummary, SCHEMA_VERSION,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference brew temperature in °C
pub const BASELINE_TEMP_C: f64 = 92.0;

/// Goal tags that pull toward clarity / florality
pub const CLARITY_TAGS: &[&str] = &["clarity", "floral", "citrus_acidity", "acidity"];

/// Goal tags that pull toward body / texture
pub const BODY_TAGS: &[&str] = &["body", "syrupy_body", "round"];

const COARSE_LABELS: &[&str] = &["coarse", "medium-coarse", "coarser", "flatburr-coarse"];
const FINE_LABELS: &[&str] = &["fine", "medium-fine", "finer", "espressoish"];

pub fn leans_clarity(tags: &[String]) -> bool {
    tags.iter().any(|t| CLARITY_TAGS.contains(&t.as_str()))
}

pub fn leans_body(tags: &[String]) -> bool {
    tags.iter().any(|t| BODY_TAGS.contains(&t.as_str()))
}

/// Grind label family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrindFamily {
    Coarse,
    Fine,
    Neutral,
}

impl GrindFamily {
    pub fn classify(label: Option<&str>) -> Self {
        let label = match label {
            Some(l) => l.trim().to_lowercase(),
            None => return GrindFamily::Neutral,
        };
        if COARSE_LABELS.contains(&label.as_str()) || label.contains("coarse") {
            GrindFamily::Coarse
        } else if FINE_LABELS.contains(&label.as_str()) || label.contains("fine") {
            GrindFamily::Fine
        } else {
            GrindFamily::Neutral
        }
    }

    pub fn delta(&self) -> f64 {
        match self {
            GrindFamily::Coarse => 0.2,
            GrindFamily::Fine => -0.2,
            GrindFamily::Neutral => 0.0,
        }
    }
}

/// Agitation delta for a label; unknown labels count as moderate
pub fn agitation_delta(label: Option<&str>) -> f64 {
    match label.map(|l| l.trim().to_lowercase()).as_deref() {
        Some("gentle") => -0.2,
        Some("high") => 0.2,
        _ => 0.0,
    }
}

/// Output of [`derive`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub goal_tags: Vec<String>,
    pub sentiment: f64,
    pub nudges: Overlay,
}

/// Deduplicated union of goal tags, first-seen order, trimmed and lowercased
pub fn goal_tags(goals: &[GoalItem]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in goals.iter().flat_map(|g| g.tags.iter()) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// `(rating - 3) / 2` clamped to `[-1, 1]`; neutral when absent
pub fn sentiment(overall: Option<f64>) -> f64 {
    match overall {
        Some(r) if r.is_finite() => clip((r - 3.0) / 2.0, 1.0),
        _ => 0.0,
    }
}

/// What the brewer did relative to 92 °C / medium / moderate
pub fn nudges(protocol: &ProtocolSummary) -> Overlay {
    let temp = protocol.temperature_c.unwrap_or(BASELINE_TEMP_C);
    Overlay::new(
        (temp - BASELINE_TEMP_C) / 10.0,
        GrindFamily::classify(protocol.grind_label.as_deref()).delta(),
        agitation_delta(protocol.agitation_overall.as_deref()),
    )
}

/// Derive all features from a payload
pub fn derive(payload: &FeedbackPayload) -> DerivedFeatures {
    DerivedFeatures {
        goal_tags: goal_tags(&payload.goals),
        sentiment: sentiment(payload.ratings.overall),
        nudges: nudges(&payload.protocol),
    }
}

fn required(field: &str, value: &Option<String>) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BrewError::MalformedInput(format!("{} is required", field)))
}

/// Validate identity and build the immutable event for persistence
pub fn to_event(payload: &FeedbackPayload, now: DateTime<Utc>) -> Result<FeedbackEvent> {
    let user_id = required("user_id", &payload.user_id)?;
    let session_id = required("session_id", &payload.session_id)?;
    let features = derive(payload);

    Ok(FeedbackEvent {
        schema_version: SCHEMA_VERSION,
        user_id,
        session_id,
        goal_tags: features.goal_tags,
        sentiment: features.sentiment,
        nudges: features.nudges,
        notes_confirmed: payload.notes_confirmed.clone(),
        notes_missing: payload.notes_missing.clone(),
        rating_overall: payload.ratings.overall,
        protocol: payload.protocol.clone(),
        context: payload.context.clone(),
        decision: payload.decision.clone(),
        predicted_notes: payload
            .prediction
            .as_ref()
            .map(|p| p.predicted_notes.clone())
            .unwrap_or_default(),
        free_text: payload.free_text.clone(),
        timestamp: payload.created_at.unwrap_or(now),
    })
}
