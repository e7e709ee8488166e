//! Feedback ingestion command

use anyhow::Context;
use brewlearn_core::{FeedbackPayload, LearningEngine};

use super::helpers::{print_json, read_input};

/// Handle `feedback --file <payload.json|->`
pub fn handle(engine: &LearningEngine, file: &str) -> anyhow::Result<()> {
    let raw = read_input(file)?;
    let payload: FeedbackPayload =
        serde_json::from_str(&raw).context("Feedback payload is not valid JSON")?;

    let outcome = engine.handle_feedback(&payload)?;
    print_json(&outcome)
}
