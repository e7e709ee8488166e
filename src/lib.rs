//! Brewlearn - Personalization and Learning Core for Brew Recommendations
//!
//! Learns from brewing feedback and turns it into a small, bounded overlay
//! (temperature, grind and agitation deltas) that a recipe generator layers
//! on top of its baseline recommendation:
//! - Global goal × variable association edges
//! - Per-user preference profiles with half-life decay
//! - Shadow, cohort and surrogate models
//! - Spaced-repetition curriculum and practice micro-overlays
//! - A warmup gate so nothing is learned from a user's first few sessions
//!
//! # Architecture
//!
//! - **Types**: Feedback payloads, events and overlays
//! - **Storage**: One schema-versioned JSON document per scope, locked and
//!   atomically replaced
//! - **Learning**: The learners and the overlay composer
//! - **Maintenance**: Decay, pruning, discovery and offline evaluation
//!
//! # Example
//!
//! ```ignore
//! use brewlearn_core::{BrewContext, LearningConfig, LearningEngine};
//!
//! fn main() -> brewlearn_core::Result<()> {
//!     let engine = LearningEngine::new(LearningConfig::load(None)?)?;
//!
//!     let overlay = engine.compute_overlays(
//!         "user-42",
//!         &["floral".to_string()],
//!         &BrewContext::default(),
//!         None,
//!     )?;
//!     println!("{}", overlay.explanation);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod learning;
pub mod maintenance;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LearningConfig;
pub use engine::{FeedbackOutcome, LearnerSummary, LearningEngine, LearningStateView};
pub use error::{BrewError, Result};
pub use learning::{FlagOverrides, FlagSet, LearningMode, Skill};
pub use storage::{FileSessionStore, JsonStore, SessionStore};
pub use types::{
    BrewContext, FeedbackEvent, FeedbackPayload, Overlay, OverlayResult, SourceTrace, VarKey,
};
