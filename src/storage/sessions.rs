//! File-backed session log
//!
//! One document per session at `history/sessions/{user}__{session}.json`,
//! both ids passed through [`encode_scope`]. The first submission of a
//! session wins; later ones are reported as duplicates and not written.

use super::{encode_scope, paths, Appended, JsonStore, SessionStore};
use crate::error::{BrewError, Result};
use crate::types::FeedbackEvent;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// [`SessionStore`] on top of a [`JsonStore`]
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    store: Arc<JsonStore>,
}

impl FileSessionStore {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    fn session_doc(user_id: &str, session_id: &str) -> Result<super::DocPath> {
        if user_id.trim().is_empty() || session_id.trim().is_empty() {
            return Err(BrewError::MalformedInput(
                "user_id and session_id are required".to_string(),
            ));
        }
        Ok(super::DocPath::global(&format!(
            "{}/{}__{}.json",
            paths::SESSIONS,
            encode_scope(user_id),
            encode_scope(session_id)
        )))
    }

    fn load_all(&self) -> Result<Vec<FeedbackEvent>> {
        let files = self.store.list_dir(paths::SESSIONS)?;
        Ok(files
            .iter()
            .filter_map(|path| self.store.load_path::<FeedbackEvent>(path))
            .collect())
    }
}

impl SessionStore for FileSessionStore {
    fn append(&self, event: &FeedbackEvent) -> Result<Appended> {
        let doc = Self::session_doc(&event.user_id, &event.session_id)?;
        let created = self.store.create(&doc, event)?;
        Ok(Appended {
            handle: self.store.resolve(&doc),
            created,
        })
    }

    fn read(&self, handle: &Path) -> Result<Option<FeedbackEvent>> {
        Ok(self.store.load_path(handle))
    }

    fn list(&self, since: Option<DateTime<Utc>>) -> Result<Vec<FeedbackEvent>> {
        let mut events: Vec<FeedbackEvent> = self
            .load_all()?
            .into_iter()
            .filter(|e| since.map(|cutoff| e.timestamp >= cutoff).unwrap_or(true))
            .collect();
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.user_id.cmp(&b.user_id))
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(events)
    }

    fn count_for_user(&self, user_id: &str) -> Result<usize> {
        let prefix = format!("{}__", encode_scope(user_id));
        let files = self.store.list_dir(paths::SESSIONS)?;
        Ok(files
            .iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix))
                    .unwrap_or(false)
            })
            .filter_map(|path| self.store.load_path::<FeedbackEvent>(path))
            .filter(|e| e.user_id == user_id)
            .count())
    }
}
