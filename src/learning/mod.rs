//! Learners and overlay composition
//!
//! Feedback flows in through [`features`] and the warmup [`evaluator`]; once
//! learning is live it updates the [`edges`], [`personalizer`], [`shadow`],
//! [`cohort`] and [`surrogate`] learners. The [`composer`] reads them back
//! (through the traits in [`sources`]) to produce a bounded overlay.

pub mod cohort;
pub mod composer;
pub mod curriculum;
pub mod edges;
pub mod ema;
pub mod evaluator;
pub mod explain;
pub mod features;
pub mod flags;
pub mod personalizer;
pub mod practice;
pub mod profile_index;
pub mod progress;
pub mod shadow;
pub mod sources;
pub mod surrogate;
pub mod telemetry;

pub use cohort::CohortModel;
pub use composer::{ComposerSources, OverlayComposer};
pub use curriculum::{Curriculum, CurriculumState, PracticeTask, ReviewOutcome, Skill};
pub use edges::{EdgeGraph, EdgeLearner, EdgeRecord};
pub use evaluator::{Evaluator, EvaluatorState, LearningMode};
pub use explain::{Explanation, ExplanationLog};
pub use flags::{FlagOverrides, FlagResolver, FlagSet};
pub use personalizer::{PersonalProfile, Personalizer, Preferences};
pub use practice::{PracticeManager, PracticeState, PracticeVariant};
pub use profile_index::{ProfileIndex, ProfileIndexEntry};
pub use progress::{GlobalProgress, ProgressReport, ProgressTracker};
pub use shadow::ShadowModel;
pub use sources::MicroOverlay;
pub use surrogate::SurrogatePlanner;
pub use telemetry::{ClipTelemetry, WatchdogReport, WatchdogStatus};
