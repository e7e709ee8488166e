//! Human-readable explanation of a composed overlay
//!
//! One goal-aware sentence plus bracketed tags naming the source groups
//! that contributed. The last explanation per user is persisted so a client
//! can show it after the fact.

use super::features::{leans_body, leans_clarity};
use crate::error::Result;
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::{schema_version, Overlay, SourceTrace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Trace magnitude below which a source group is not mentioned
const TAG_EPSILON: f64 = 1e-6;
const ELLIPSIS: &str = "...";

/// Resolve the explanation hint: context, then goal leaning, then micro-overlay
pub fn resolve_hint(
    context_hint: Option<&str>,
    goal_tags: &[String],
    micro_hint: Option<&str>,
) -> Option<String> {
    if let Some(hint) = context_hint.map(str::trim).filter(|h| !h.is_empty()) {
        return Some(hint.to_lowercase());
    }
    if leans_clarity(goal_tags) {
        return Some("clarity".to_string());
    }
    if leans_body(goal_tags) {
        return Some("body".to_string());
    }
    micro_hint.map(str::to_string)
}

fn sentence(hint: Option<&str>) -> &'static str {
    match hint {
        Some(h) if h.contains("clarity") || h.contains("floral") => {
            "Cooler water & gentler pours for clarity"
        }
        Some(h) if h.contains("body") => "Slightly finer & warmer for fuller body",
        _ => "Small tweaks applied for goal",
    }
}

/// Truncate to `max_chars` characters, ending in `...` when cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

pub fn compose(hint: Option<&str>, trace: &SourceTrace, max_chars: usize) -> String {
    let mut text = sentence(hint).to_string();
    let groups = [
        ("[prior]", trace.prior()),
        ("[history]", trace.history()),
        ("[edge]", trace.edge()),
        ("[model]", trace.model()),
    ];
    for (tag, magnitude) in groups {
        if magnitude > TAG_EPSILON {
            text.push(' ');
            text.push_str(tag);
        }
    }
    truncate(&text, max_chars)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub trace: SourceTrace,
    #[serde(default)]
    pub overlay: Overlay,
    #[serde(default)]
    pub clipped: bool,
    pub created_at: DateTime<Utc>,
}

pub struct ExplanationLog {
    store: Arc<JsonStore>,
}

impl ExplanationLog {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    pub fn save(&self, explanation: &Explanation) -> Result<()> {
        let doc = DocPath::scoped(paths::EXPLANATIONS, &explanation.user_id)?;
        self.store.write(&doc, explanation)
    }

    pub fn load_last(&self, user_id: &str) -> Result<Option<Explanation>> {
        Ok(self.store.load(&DocPath::scoped(paths::EXPLANATIONS, user_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hint_precedence() {
        assert_eq!(
            resolve_hint(Some(" Body "), &tags(&["floral"]), Some("clarity")).as_deref(),
            Some("body")
        );
        assert_eq!(
            resolve_hint(None, &tags(&["floral"]), Some("body")).as_deref(),
            Some("clarity")
        );
        assert_eq!(resolve_hint(None, &[], Some("body")).as_deref(), Some("body"));
        assert_eq!(resolve_hint(Some("  "), &[], None), None);
    }

    #[test]
    fn test_compose_tags() {
        let trace = SourceTrace {
            cohort: 0.1,
            edges: 0.2,
            shadow: 0.0,
            ..Default::default()
        };
        assert_eq!(
            compose(Some("clarity"), &trace, 140),
            "Cooler water & gentler pours for clarity [prior] [edge]"
        );
        assert_eq!(
            compose(None, &SourceTrace::default(), 140),
            "Small tweaks applied for goal"
        );
    }

    #[test]
    fn test_truncate_is_char_based() {
        let long = "é".repeat(200);
        let cut = truncate(&long, 140);
        assert_eq!(cut.chars().count(), 140);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate("short", 140), "short");
    }

    #[test]
    fn test_save_and_load_last() {
        let dir = TempDir::new().unwrap();
        let log = ExplanationLog::new(Arc::new(JsonStore::open(dir.path()).unwrap()));
        assert!(log.load_last("u1").unwrap().is_none());

        let explanation = Explanation {
            schema_version: schema_version(),
            user_id: "u1".to_string(),
            text: "Small tweaks applied for goal".to_string(),
            trace: SourceTrace::default(),
            overlay: Overlay::new(0.1, 0.0, 0.0),
            clipped: false,
            created_at: Utc::now(),
        };
        log.save(&explanation).unwrap();
        assert_eq!(log.load_last("u1").unwrap(), Some(explanation));
    }
}
