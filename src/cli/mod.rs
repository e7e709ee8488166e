//! CLI command handlers
//!
//! Each subcommand group is implemented in its own module.

pub mod curriculum;
pub mod feedback;
pub mod flags;
pub mod helpers;
pub mod maintain;
pub mod suggest;
