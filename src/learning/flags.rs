//! Feature flags controlling which overlay sources are active
//!
//! Resolution per request: request override > user override > global >
//! compiled default. Flag documents are reread on every resolve so they can
//! be flipped at runtime.

use crate::error::{BrewError, Result};
use crate::storage::{paths, DocPath, JsonStore};
use crate::types::schema_version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Flag names accepted by [`FlagOverrides::set`]
pub const FLAG_NAMES: [&str; 6] = [
    "use_learned_edges",
    "use_user_personalisation",
    "use_practice",
    "use_curriculum",
    "use_model_planner",
    "use_cohort_seed",
];

/// Fully resolved flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet {
    pub use_learned_edges: bool,
    pub use_user_personalisation: bool,
    pub use_practice: bool,
    pub use_curriculum: bool,
    pub use_model_planner: bool,
    pub use_cohort_seed: bool,
}

impl Default for FlagSet {
    fn default() -> Self {
        Self {
            use_learned_edges: true,
            use_user_personalisation: true,
            use_practice: true,
            use_curriculum: true,
            use_model_planner: false,
            use_cohort_seed: true,
        }
    }
}

/// Partial flag assignment; `None` defers to the next layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_learned_edges: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_user_personalisation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_practice: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_curriculum: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_model_planner: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_cohort_seed: Option<bool>,
}

impl FlagOverrides {
    /// Layer these overrides on top of `base`
    pub fn apply(&self, base: FlagSet) -> FlagSet {
        FlagSet {
            use_learned_edges: self.use_learned_edges.unwrap_or(base.use_learned_edges),
            use_user_personalisation: self
                .use_user_personalisation
                .unwrap_or(base.use_user_personalisation),
            use_practice: self.use_practice.unwrap_or(base.use_practice),
            use_curriculum: self.use_curriculum.unwrap_or(base.use_curriculum),
            use_model_planner: self.use_model_planner.unwrap_or(base.use_model_planner),
            use_cohort_seed: self.use_cohort_seed.unwrap_or(base.use_cohort_seed),
        }
    }

    /// Set a flag by name (`None` clears it)
    pub fn set(&mut self, name: &str, value: Option<bool>) -> Result<()> {
        let slot = match name.trim() {
            "use_learned_edges" => &mut self.use_learned_edges,
            "use_user_personalisation" | "use_user_personalization" => {
                &mut self.use_user_personalisation
            }
            "use_practice" => &mut self.use_practice,
            "use_curriculum" => &mut self.use_curriculum,
            "use_model_planner" => &mut self.use_model_planner,
            "use_cohort_seed" => &mut self.use_cohort_seed,
            other => {
                return Err(BrewError::MalformedInput(format!(
                    "unknown flag '{}' (expected one of {})",
                    other,
                    FLAG_NAMES.join(", ")
                )))
            }
        };
        *slot = value;
        Ok(())
    }

    /// Parse `name=true|false` pairs
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut overrides = Self::default();
        for pair in pairs {
            let pair = pair.as_ref();
            let (name, raw) = pair.split_once('=').ok_or_else(|| {
                BrewError::MalformedInput(format!("expected name=bool, got '{}'", pair))
            })?;
            let value = match raw.trim().to_lowercase().as_str() {
                "true" | "on" | "1" | "yes" => true,
                "false" | "off" | "0" | "no" => false,
                other => {
                    return Err(BrewError::MalformedInput(format!(
                        "flag '{}' expects a boolean, got '{}'",
                        name, other
                    )))
                }
            };
            overrides.set(name, Some(value))?;
        }
        Ok(overrides)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FlagDocument {
    #[serde(default = "schema_version")]
    schema_version: u32,
    #[serde(default)]
    flags: FlagOverrides,
}

/// Reads and writes persisted flag layers
pub struct FlagResolver {
    store: Arc<JsonStore>,
}

impl FlagResolver {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    fn global_doc() -> DocPath {
        DocPath::global(paths::GLOBAL_FLAGS)
    }

    fn user_doc(user_id: &str) -> Result<DocPath> {
        DocPath::scoped(paths::USER_FLAGS, user_id)
    }

    pub fn global_overrides(&self) -> FlagOverrides {
        self.store
            .load::<FlagDocument>(&Self::global_doc())
            .map(|d| d.flags)
            .unwrap_or_default()
    }

    pub fn user_overrides(&self, user_id: &str) -> FlagOverrides {
        Self::user_doc(user_id)
            .ok()
            .and_then(|doc| self.store.load::<FlagDocument>(&doc))
            .map(|d| d.flags)
            .unwrap_or_default()
    }

    /// Resolve flags for a request
    pub fn resolve(&self, user_id: Option<&str>, request: Option<&FlagOverrides>) -> FlagSet {
        let mut flags = self.global_overrides().apply(FlagSet::default());
        if let Some(user) = user_id {
            flags = self.user_overrides(user).apply(flags);
        }
        if let Some(request) = request {
            flags = request.apply(flags);
        }
        flags
    }

    pub fn set_global(&self, name: &str, value: Option<bool>) -> Result<FlagOverrides> {
        let flags = self
            .store
            .try_update(&Self::global_doc(), FlagDocument::default, |doc| {
                doc.flags.set(name, value)?;
                doc.schema_version = schema_version();
                Ok(doc.flags)
            })?;
        info!("Global flag {} set to {:?}", name, value);
        Ok(flags)
    }

    pub fn set_user(&self, user_id: &str, name: &str, value: Option<bool>) -> Result<FlagOverrides> {
        let doc = Self::user_doc(user_id)?;
        let flags = self.store.try_update(&doc, FlagDocument::default, |doc| {
            doc.flags.set(name, value)?;
            doc.schema_version = schema_version();
            Ok(doc.flags)
        })?;
        info!("Flag {} for {} set to {:?}", name, user_id, value);
        Ok(flags)
    }
}
