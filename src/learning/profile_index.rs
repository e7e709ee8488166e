//! Compact index of personal profiles
//!
//! Mirrors the stable fields of every profile into one document,
//! `state/profile_index.json`, keyed by user id, so a reader can scan all
//! users without opening each profile.

use super::personalizer::PersonalProfile;
use crate::error::Result;
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::schema_version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileIndexEntry {
    #[serde(default)]
    pub trait_response: BTreeMap<String, f64>,
    #[serde(default)]
    pub note_sensitivity: BTreeMap<String, f64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history_count: u32,
}

impl From<&PersonalProfile> for ProfileIndexEntry {
    fn from(profile: &PersonalProfile) -> Self {
        Self {
            trait_response: profile.trait_response.clone(),
            note_sensitivity: profile.note_sensitivity.clone(),
            updated_at: profile.last_seen,
            history_count: profile.history_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileIndexDoc {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, ProfileIndexEntry>,
}

impl Default for ProfileIndexDoc {
    fn default() -> Self {
        Self {
            schema_version: schema_version(),
            entries: BTreeMap::new(),
        }
    }
}

pub struct ProfileIndex {
    store: Arc<JsonStore>,
}

impl ProfileIndex {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    fn doc() -> DocPath {
        DocPath::global(paths::PROFILE_INDEX)
    }

    pub fn snapshot(&self) -> ProfileIndexDoc {
        self.store.read_or(&Self::doc(), ProfileIndexDoc::default)
    }

    pub fn get(&self, user_id: &str) -> Option<ProfileIndexEntry> {
        self.snapshot().entries.remove(user_id)
    }

    /// Upsert one profile's entry
    pub fn sync(&self, profile: &PersonalProfile) -> Result<ProfileIndexEntry> {
        let entry = ProfileIndexEntry::from(profile);
        self.store.update(&Self::doc(), ProfileIndexDoc::default, |index| {
            index.schema_version = schema_version();
            index.entries.insert(profile.user_id.clone(), entry.clone());
        })?;
        debug!("Indexed profile {}", profile.user_id);
        Ok(entry)
    }

    /// Sync one user from their stored profile; `None` when no profile exists
    pub fn sync_user(&self, user_id: &str) -> Result<Option<ProfileIndexEntry>> {
        let profile: Option<PersonalProfile> =
            self.store.load(&DocPath::scoped(paths::PROFILES, user_id)?);
        profile.map(|p| self.sync(&p)).transpose()
    }

    /// Sync the given users, or every stored profile when `None`; returns entries written
    pub fn backfill(&self, user_ids: Option<&[String]>) -> Result<usize> {
        let mut written = 0;
        match user_ids {
            Some(ids) => {
                for id in ids {
                    if self.sync_user(id)?.is_some() {
                        written += 1;
                    }
                }
            }
            None => {
                for path in self.store.list_dir(paths::PROFILES)? {
                    if let Some(profile) = self.store.load_path::<PersonalProfile>(&path) {
                        self.sync(&profile)?;
                        written += 1;
                    }
                }
            }
        }
        info!("Backfilled {} profile index entries", written);
        Ok(written)
    }
}
