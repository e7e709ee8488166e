//! Common test utilities and helpers

#![allow(dead_code)]

use brewlearn_core::types::{ArmDecision, GoalItem, Prediction, ProtocolSummary, Ratings};
use brewlearn_core::{FeedbackPayload, LearningConfig, LearningEngine, ManualClock};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

/// Engine over a fresh data directory with a manual clock
pub fn create_test_engine() -> (TempDir, Arc<ManualClock>, LearningEngine) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let clock = Arc::new(ManualClock::new(test_start()));
    let engine = LearningEngine::with_clock(LearningConfig::with_data_dir(dir.path()), clock.clone())
        .expect("Failed to create test engine");
    (dir, clock, engine)
}

/// Builder for feedback payloads
pub struct PayloadBuilder {
    payload: FeedbackPayload,
}

impl PayloadBuilder {
    pub fn new(user: &str, session: &str) -> Self {
        Self {
            payload: FeedbackPayload {
                user_id: Some(user.to_string()),
                session_id: Some(session.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn goals(mut self, tags: &[&str]) -> Self {
        self.payload.goals = vec![GoalItem {
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }];
        self
    }

    pub fn rating(mut self, overall: f64) -> Self {
        self.payload.ratings = Ratings {
            overall: Some(overall),
            ..Default::default()
        };
        self
    }

    pub fn protocol(mut self, temperature_c: f64, grind: &str, agitation: &str) -> Self {
        self.payload.protocol = ProtocolSummary {
            temperature_c: Some(temperature_c),
            grind_label: Some(grind.to_string()),
            agitation_overall: Some(agitation.to_string()),
            ..Default::default()
        };
        self
    }

    pub fn decision(mut self, arm: &str, propensity: f64) -> Self {
        self.payload.decision = Some(ArmDecision {
            arm: arm.to_string(),
            propensity,
        });
        self
    }

    pub fn notes(mut self, predicted: &[&str], confirmed: &[&str]) -> Self {
        self.payload.prediction = Some(Prediction {
            predicted_notes: predicted.iter().map(|n| n.to_string()).collect(),
        });
        self.payload.notes_confirmed = confirmed.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn free_text(mut self, text: &str) -> Self {
        self.payload.free_text = Some(text.to_string());
        self
    }

    pub fn build(self) -> FeedbackPayload {
        self.payload
    }
}

/// A loved body-leaning brew: hotter, coarser, more agitation
pub fn body_payload(user: &str, session: &str) -> FeedbackPayload {
    PayloadBuilder::new(user, session)
        .goals(&["body"])
        .rating(5.0)
        .protocol(94.0, "coarse", "high")
        .build()
}
