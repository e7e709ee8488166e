//! Core data types for the brewlearn learning core
//!
//! Defines the recommendation variables, the bounded delta vector ("overlay")
//! every learner emits, the raw feedback payload accepted from clients, and
//! the immutable feedback event persisted per session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Current schema version stamped on every persisted document
pub const SCHEMA_VERSION: u32 = 1;

pub(crate) fn schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Clamp `value` into `[-limit, limit]`; NaN collapses to zero
pub fn clip(value: f64, limit: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-limit, limit)
}

/// Recommendation variable a learner can adjust
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKey {
    TempDelta,
    GrindDelta,
    AgitationDelta,
}

impl VarKey {
    pub const ALL: [VarKey; 3] = [VarKey::TempDelta, VarKey::GrindDelta, VarKey::AgitationDelta];

    pub fn as_str(&self) -> &'static str {
        match self {
            VarKey::TempDelta => "temp_delta",
            VarKey::GrindDelta => "grind_delta",
            VarKey::AgitationDelta => "agitation_delta",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "temp_delta" => Some(VarKey::TempDelta),
            "grind_delta" => Some(VarKey::GrindDelta),
            "agitation_delta" => Some(VarKey::AgitationDelta),
            _ => None,
        }
    }
}

impl fmt::Display for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signed delta vector over the three recommendation variables
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overlay {
    pub temp_delta: f64,
    pub grind_delta: f64,
    pub agitation_delta: f64,
}

impl Overlay {
    pub const ZERO: Overlay = Overlay {
        temp_delta: 0.0,
        grind_delta: 0.0,
        agitation_delta: 0.0,
    };

    pub fn new(temp_delta: f64, grind_delta: f64, agitation_delta: f64) -> Self {
        Self {
            temp_delta,
            grind_delta,
            agitation_delta,
        }
    }

    pub fn get(&self, key: VarKey) -> f64 {
        match key {
            VarKey::TempDelta => self.temp_delta,
            VarKey::GrindDelta => self.grind_delta,
            VarKey::AgitationDelta => self.agitation_delta,
        }
    }

    pub fn set(&mut self, key: VarKey, value: f64) {
        match key {
            VarKey::TempDelta => self.temp_delta = value,
            VarKey::GrindDelta => self.grind_delta = value,
            VarKey::AgitationDelta => self.agitation_delta = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarKey, f64)> + '_ {
        VarKey::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// Apply `f` to every component
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.temp_delta), f(self.grind_delta), f(self.agitation_delta))
    }

    /// Per-component clamp to `[-limit, limit]`
    pub fn clamped(self, limit: f64) -> Self {
        self.map(|v| clip(v, limit))
    }

    pub fn scaled(self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }

    /// Sum of absolute components
    pub fn magnitude(&self) -> f64 {
        self.temp_delta.abs() + self.grind_delta.abs() + self.agitation_delta.abs()
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude() == 0.0
    }

    /// Largest absolute per-component difference
    pub fn max_abs_diff(&self, other: &Overlay) -> f64 {
        VarKey::ALL
            .iter()
            .map(|&k| (self.get(k) - other.get(k)).abs())
            .fold(0.0, f64::max)
    }
}

impl Add for Overlay {
    type Output = Overlay;

    fn add(self, rhs: Overlay) -> Overlay {
        Overlay::new(
            self.temp_delta + rhs.temp_delta,
            self.grind_delta + rhs.grind_delta,
            self.agitation_delta + rhs.agitation_delta,
        )
    }
}

impl AddAssign for Overlay {
    fn add_assign(&mut self, rhs: Overlay) {
        *self = *self + rhs;
    }
}

// Lenient field parsers: malformed client values default instead of failing
// the whole payload.

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    });
    Ok(parsed.filter(|x| x.is_finite()))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// One goal item from a feedback form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalItem {
    #[serde(deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,
}

/// Sensory ratings on a 1-5 scale
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ratings {
    #[serde(deserialize_with = "lenient_f64")]
    pub overall: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub clarity: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub body: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub acidity: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub bitterness: Option<f64>,
}

/// Protocol actually brewed for a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSummary {
    #[serde(deserialize_with = "lenient_string")]
    pub method: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub ratio: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub temperature_c: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub grind_label: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub agitation_overall: Option<String>,
}

impl ProtocolSummary {
    /// Neutral reference protocol (92 °C, medium grind, moderate agitation)
    pub fn baseline() -> Self {
        Self {
            method: None,
            ratio: None,
            temperature_c: Some(92.0),
            grind_label: Some("medium".to_string()),
            agitation_overall: Some("moderate".to_string()),
        }
    }
}

/// Brew context supplied by the recipe generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrewContext {
    #[serde(deserialize_with = "lenient_string")]
    pub process: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub roast: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub ratio_denominator: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub temperature_bucket: Option<String>,
    #[serde(deserialize_with = "lenient_string", alias = "filter_perm")]
    pub filter_permeability: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub geometry: Option<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub priors_used: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub hint: Option<String>,
}

impl BrewContext {
    /// Cohort key `process|roast|filter`, `_` standing in for missing parts
    pub fn cohort_key(&self) -> String {
        let part = |v: &Option<String>| {
            v.as_deref()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "_".to_string())
        };
        format!(
            "{}|{}|{}",
            part(&self.process),
            part(&self.roast),
            part(&self.filter_permeability)
        )
    }

    /// Whether any cohort dimension is known
    pub fn has_cohort(&self) -> bool {
        self.cohort_key() != "_|_|_"
    }
}

/// A logged exploration decision (arm served and its propensity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmDecision {
    pub arm: String,
    #[serde(alias = "pi")]
    pub propensity: f64,
}

/// What the recipe service predicted the cup would show
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prediction {
    #[serde(deserialize_with = "lenient_strings")]
    pub predicted_notes: Vec<String>,
}

/// Raw feedback as submitted by a client; every field tolerates absence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackPayload {
    #[serde(deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
    pub goals: Vec<GoalItem>,
    pub ratings: Ratings,
    pub protocol: ProtocolSummary,
    #[serde(deserialize_with = "lenient_strings")]
    pub notes_confirmed: Vec<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub notes_missing: Vec<String>,
    pub context: BrewContext,
    pub decision: Option<ArmDecision>,
    pub prediction: Option<Prediction>,
    #[serde(deserialize_with = "lenient_string")]
    pub free_text: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Immutable record of one feedback session, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub user_id: String,
    pub session_id: String,
    pub goal_tags: Vec<String>,
    pub sentiment: f64,
    pub nudges: Overlay,
    #[serde(default)]
    pub notes_confirmed: Vec<String>,
    #[serde(default)]
    pub notes_missing: Vec<String>,
    #[serde(default)]
    pub rating_overall: Option<f64>,
    #[serde(default)]
    pub protocol: ProtocolSummary,
    #[serde(default)]
    pub context: BrewContext,
    #[serde(default)]
    pub decision: Option<ArmDecision>,
    #[serde(default)]
    pub predicted_notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Summed absolute contribution of each overlay source
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceTrace {
    pub cohort: f64,
    pub edges: f64,
    pub personal: f64,
    pub schedule: f64,
    pub shadow: f64,
    pub planner: f64,
}

impl SourceTrace {
    /// Population-level priors: cohort seed and practice/curriculum micro-overlay
    pub fn prior(&self) -> f64 {
        self.cohort + self.schedule
    }

    /// The user's own history: personal profile and shadow model
    pub fn history(&self) -> f64 {
        self.personal + self.shadow
    }

    pub fn edge(&self) -> f64 {
        self.edges
    }

    pub fn model(&self) -> f64 {
        self.planner
    }
}

/// Final bounded adjustment handed to the recipe generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayResult {
    #[serde(flatten)]
    pub overlay: Overlay,
    pub trace: SourceTrace,
    pub clipped: bool,
    pub explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_handles_nan() {
        assert_eq!(clip(f64::NAN, 0.3), 0.0);
        assert_eq!(clip(0.5, 0.3), 0.3);
        assert_eq!(clip(-0.5, 0.3), -0.3);
        assert_eq!(clip(0.1, 0.3), 0.1);
    }

    #[test]
    fn test_overlay_arithmetic() {
        let mut a = Overlay::new(0.1, -0.2, 0.0);
        a += Overlay::new(0.3, -0.2, 0.05);
        assert!((a.temp_delta - 0.4).abs() < 1e-9);
        assert!((a.grind_delta + 0.4).abs() < 1e-9);

        let capped = a.clamped(0.3);
        assert!((capped.temp_delta - 0.3).abs() < 1e-9);
        assert!((capped.grind_delta + 0.3).abs() < 1e-9);
        assert!((capped.magnitude() - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_overlay_serializes_with_variable_keys() {
        let json = serde_json::to_value(Overlay::new(0.1, 0.0, -0.1)).unwrap();
        assert!(json.get("temp_delta").is_some());
        assert!(json.get("grind_delta").is_some());
        assert!(json.get("agitation_delta").is_some());
    }

    #[test]
    fn test_var_key_parse() {
        for key in VarKey::ALL {
            assert_eq!(VarKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(VarKey::parse("bloom_delta"), None);
    }

    #[test]
    fn test_payload_tolerates_malformed_fields() {
        let raw = r#"{
            "user_id": "u1",
            "session_id": 42,
            "ratings": {"overall": "4", "clarity": "great"},
            "protocol": {"temperature_c": [1, 2], "grind_label": "Medium-Fine"},
            "goals": [{"tags": ["body", 3, ""]}, {"tags": "clarity"}],
            "notes_confirmed": "jasmine"
        }"#;

        let payload: FeedbackPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.session_id.as_deref(), Some("42"));
        assert_eq!(payload.ratings.overall, Some(4.0));
        assert_eq!(payload.ratings.clarity, None);
        assert_eq!(payload.protocol.temperature_c, None);
        assert_eq!(payload.goals[0].tags, vec!["body".to_string()]);
        assert_eq!(payload.goals[1].tags, vec!["clarity".to_string()]);
        assert_eq!(payload.notes_confirmed, vec!["jasmine".to_string()]);
    }

    #[test]
    fn test_cohort_key_placeholders() {
        let ctx = BrewContext {
            process: Some("Washed".to_string()),
            filter_permeability: Some("fast".to_string()),
            ..Default::default()
        };
        assert_eq!(ctx.cohort_key(), "washed|_|fast");
        assert!(ctx.has_cohort());
        assert!(!BrewContext::default().has_cohort());
    }

    #[test]
    fn test_overlay_result_flattens_deltas() {
        let result = OverlayResult {
            overlay: Overlay::new(0.1, 0.0, 0.0),
            trace: SourceTrace::default(),
            clipped: false,
            explanation: "Small tweaks applied for goal".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("temp_delta").is_some());
        assert!(json.get("trace").is_some());
    }
}
