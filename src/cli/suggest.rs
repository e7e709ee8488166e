//! Overlay composition and explanation commands

use brewlearn_core::{BrewContext, FlagOverrides, LearningEngine};
use clap::Args;

use super::helpers::print_json;

#[derive(Args)]
pub struct SuggestArgs {
    /// User to compose the overlay for
    #[arg(short, long)]
    pub user: String,

    /// Goal tag (repeatable)
    #[arg(short, long = "goal")]
    pub goals: Vec<String>,

    /// Coffee process (washed, natural, ...)
    #[arg(long)]
    pub process: Option<String>,

    /// Roast level
    #[arg(long)]
    pub roast: Option<String>,

    /// Filter permeability
    #[arg(long)]
    pub filter: Option<String>,

    /// Explanation hint (e.g. clarity, body)
    #[arg(long)]
    pub hint: Option<String>,

    /// Per-request flag override, `name=true|false` (repeatable)
    #[arg(long = "flag")]
    pub flags: Vec<String>,
}

/// Handle `suggest`
pub fn handle(engine: &LearningEngine, args: SuggestArgs) -> anyhow::Result<()> {
    let overrides = if args.flags.is_empty() {
        None
    } else {
        Some(FlagOverrides::from_pairs(&args.flags)?)
    };

    let context = BrewContext {
        process: args.process,
        roast: args.roast,
        filter_permeability: args.filter,
        hint: args.hint,
        ..Default::default()
    };

    let result = engine.compute_overlays(&args.user, &args.goals, &context, overrides.as_ref())?;
    print_json(&result)
}

/// Handle `explain --user`
pub fn explain(engine: &LearningEngine, user: &str) -> anyhow::Result<()> {
    match engine.load_last_explanation(user)? {
        Some(explanation) => print_json(&explanation),
        None => print_json(&serde_json::json!({
            "user_id": user,
            "text": null,
        })),
    }
}
