//! Feature flag commands

use brewlearn_core::LearningEngine;
use clap::Subcommand;

use super::helpers::{parse_flag_value, print_json};

#[derive(Subcommand)]
pub enum FlagsCommands {
    /// Show resolved flags (global, or for a user)
    Show {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Set or clear a persisted flag override
    Set {
        /// Flag name, e.g. use_model_planner
        name: String,
        /// true, false or unset
        value: String,
        /// Write a per-user override instead of the global one
        #[arg(short, long)]
        user: Option<String>,
    },
}

pub fn handle(engine: &LearningEngine, command: FlagsCommands) -> anyhow::Result<()> {
    let flags = engine.flags();
    match command {
        FlagsCommands::Show { user } => {
            let resolved = flags.resolve(user.as_deref(), None);
            let overrides = match user.as_deref() {
                Some(user) => flags.user_overrides(user),
                None => flags.global_overrides(),
            };
            print_json(&serde_json::json!({
                "user_id": user,
                "resolved": resolved,
                "overrides": overrides,
            }))
        }
        FlagsCommands::Set { name, value, user } => {
            let value = parse_flag_value(&value)?;
            let overrides = match user.as_deref() {
                Some(user) => flags.set_user(user, &name, value)?,
                None => flags.set_global(&name, value)?,
            };
            print_json(&overrides)
        }
    }
}
