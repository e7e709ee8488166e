//! Curriculum, practice and progress commands

use anyhow::anyhow;
use brewlearn_core::learning::PracticeManager;
use brewlearn_core::{LearningEngine, Skill};
use clap::Subcommand;

use super::helpers::print_json;

#[derive(Subcommand)]
pub enum CurriculumCommands {
    /// Pick the next skill to practice and mark it active
    Next {
        #[arg(short, long)]
        user: String,
    },
    /// Show the active or earliest-due skill without changing anything
    Peek {
        #[arg(short, long)]
        user: String,
    },
    /// Record how a practice brew went
    Review {
        #[arg(short, long)]
        user: String,
        /// Skill reviewed; defaults to the active skill
        #[arg(short, long)]
        skill: Option<String>,
        /// Mark the attempt as failed
        #[arg(long)]
        failed: bool,
        /// Confidence 0-3
        #[arg(short, long, default_value = "2")]
        confidence: u8,
    },
    /// Show the full schedule
    Status {
        #[arg(short, long)]
        user: String,
    },
}

#[derive(Subcommand)]
pub enum PracticeCommands {
    /// Turn focus practice on (with a focus) or off
    Focus {
        #[arg(short, long)]
        user: String,
        /// Focus such as clarity or body; omit to disable practice
        focus: Option<String>,
    },
    /// Show the fixed A/B exploration variants
    Variants,
}

pub fn handle(engine: &LearningEngine, command: CurriculumCommands) -> anyhow::Result<()> {
    let curriculum = engine.curriculum();
    let now = engine.now();
    match command {
        CurriculumCommands::Next { user } => print_json(&curriculum.next_task(&user, now)?),
        CurriculumCommands::Peek { user } => print_json(&curriculum.peek_due(&user, now)?),
        CurriculumCommands::Review {
            user,
            skill,
            failed,
            confidence,
        } => {
            let skill = skill
                .map(|s| Skill::parse(&s).ok_or_else(|| anyhow!("Unknown skill '{}'", s)))
                .transpose()?;
            let outcome = curriculum.review(&user, skill, !failed, confidence, now)?;
            print_json(&outcome)
        }
        CurriculumCommands::Status { user } => print_json(&curriculum.status(&user, now)?),
    }
}

pub fn handle_practice(engine: &LearningEngine, command: PracticeCommands) -> anyhow::Result<()> {
    match command {
        PracticeCommands::Focus { user, focus } => {
            let enabled = focus.is_some();
            let state = engine
                .practice()
                .set_focus(&user, focus.as_deref(), enabled, engine.now())?;
            print_json(&state)
        }
        PracticeCommands::Variants => print_json(&PracticeManager::ab_variants()),
    }
}

/// Handle `progress --user`
pub fn progress(engine: &LearningEngine, user: &str, top: usize) -> anyhow::Result<()> {
    print_json(&serde_json::json!({
        "progress": engine.progress(user)?,
        "learning_state": engine.evaluator_state(user)?,
        "preferences": engine.preferences(user, top)?,
    }))
}
