//! Storage layer for the learning core
//!
//! Every learner persists one schema-versioned JSON document per scope
//! (user, cohort, or the global graph). Provides:
//! - [`JsonStore`]: tolerant reads, atomic write-then-rename, locked updates
//! - [`ScopeLocks`]: advisory per-document locking (in-process + `flock`)
//! - [`SessionStore`]: the append-only feedback session log

pub mod json_store;
pub mod lock;
pub mod sessions;

pub use json_store::JsonStore;
pub use lock::ScopeLocks;
pub use sessions::FileSessionStore;

use crate::error::{BrewError, Result};
use crate::types::FeedbackEvent;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Well-known document locations, relative to the data directory
pub mod paths {
    pub const EDGES: &str = "priors/dynamic_edges.json";
    pub const PENDING_PROPOSALS: &str = "priors/discovered/pending.json";
    pub const GLOBAL_FLAGS: &str = "state/flags_global.json";
    pub const CLIP_METRICS: &str = "metrics/clips.json";
    pub const GLOBAL_PROGRESS: &str = "metrics/global.json";
    pub const PROFILE_INDEX: &str = "state/profile_index.json";
    pub const WATCHDOG: &str = "state/watchdog.json";

    pub const PROFILES: &str = "profiles";
    pub const SHADOW: &str = "models/shadow";
    pub const SURROGATE: &str = "models/surrogate";
    pub const COHORTS: &str = "cohorts";
    pub const CURRICULUM: &str = "curriculum";
    pub const PRACTICE: &str = "practice";
    pub const EVALUATOR: &str = "state/evaluator";
    pub const USER_FLAGS: &str = "state/flags_users";
    pub const EXPLANATIONS: &str = "state/explain";
    pub const PROGRESS: &str = "metrics/progress";
    pub const SESSIONS: &str = "history/sessions";
}

/// Encode an identifier as a file stem
///
/// `[A-Za-z0-9-]` passes through; every other byte, `_` included, becomes
/// `_XX` (uppercase hex). Distinct ids always get distinct stems, and a stem
/// never contains `__`, so two stems joined by `__` split back uniquely.
pub fn encode_scope(raw: &str) -> String {
    let mut stem = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    stem
}

/// Relative path of a persisted document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath(PathBuf);

impl DocPath {
    /// A fixed, global document (e.g. [`paths::EDGES`])
    pub fn global(relative: &str) -> Self {
        Self(PathBuf::from(relative))
    }

    /// A per-scope document `<dir>/<encoded scope>.json`
    pub fn scoped(dir: &str, scope: &str) -> Result<Self> {
        if scope.trim().is_empty() {
            return Err(BrewError::MalformedInput(format!(
                "empty scope identifier for {}",
                dir
            )));
        }
        Ok(Self(
            Path::new(dir).join(format!("{}.json", encode_scope(scope))),
        ))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Result of appending a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// Document path of the stored session
    pub handle: PathBuf,
    /// False when the session was already stored; the earlier event is kept
    pub created: bool,
}

/// Append-only log of feedback sessions
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    /// Persist an event unless its (user, session) pair is already stored
    fn append(&self, event: &FeedbackEvent) -> Result<Appended>;

    /// Read an event back by handle
    fn read(&self, handle: &Path) -> Result<Option<FeedbackEvent>>;

    /// All events at or after `since` (all events when `None`), oldest first
    fn list(&self, since: Option<DateTime<Utc>>) -> Result<Vec<FeedbackEvent>>;

    /// Number of sessions recorded for a user
    fn count_for_user(&self, user_id: &str) -> Result<usize>;
}
