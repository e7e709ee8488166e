//! Maintenance commands (edge decay, pruning, discovery, offline evaluation)

use brewlearn_core::LearningEngine;
use clap::Subcommand;
use std::time::Duration;
use tracing::info;

use super::helpers::print_json;

#[derive(Subcommand)]
pub enum MaintainCommands {
    /// Multiply every edge score by a decay factor
    Decay {
        /// Decay factor in (0, 1]; defaults to the configured value
        #[arg(short, long)]
        factor: Option<f64>,
    },

    /// Drop weak edges and keep the strongest per goal
    Prune {
        /// Minimum absolute score to keep
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Edges kept per goal
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
    },

    /// Mine recent sessions for new goal/variable edges
    Discover {
        /// Days of sessions to scan
        #[arg(short, long)]
        window_days: Option<u32>,
    },

    /// Merge a discovered proposal into the edge graph
    Accept {
        /// Proposal id, e.g. `body|temp|+`
        id: String,
    },

    /// Estimate per-arm value from logged decisions (IPS and DR)
    OfflineEval {
        #[arg(short, long)]
        window_days: Option<u32>,
    },

    /// Re-sync the profile index from stored profiles
    Reindex {
        /// Users to sync; every stored profile when omitted
        users: Vec<String>,
    },

    /// Run the background scheduler until interrupted
    Run {
        /// Seconds between due-job checks
        #[arg(long, default_value = "60")]
        poll_secs: u64,
    },
}

pub async fn handle(engine: &LearningEngine, command: MaintainCommands) -> anyhow::Result<()> {
    match command {
        MaintainCommands::Decay { factor } => {
            info!("Running edge decay...");
            print_json(&engine.decay(factor)?)
        }
        MaintainCommands::Prune { threshold, top_n } => {
            info!("Running edge prune...");
            print_json(&engine.prune(threshold, top_n)?)
        }
        MaintainCommands::Discover { window_days } => {
            info!("Running discovery...");
            print_json(&engine.discover(window_days)?)
        }
        MaintainCommands::Accept { id } => print_json(&engine.accept_proposal(&id)?),
        MaintainCommands::OfflineEval { window_days } => {
            print_json(&engine.offline_evaluate(window_days)?)
        }
        MaintainCommands::Reindex { users } => {
            let selected = (!users.is_empty()).then_some(users.as_slice());
            let written = engine.reindex_profiles(selected)?;
            print_json(&serde_json::json!({ "written": written }))
        }
        MaintainCommands::Run { poll_secs } => {
            let scheduler = engine
                .scheduler()
                .with_poll_interval(Duration::from_secs(poll_secs.max(1)));

            tokio::select! {
                result = scheduler.start() => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, stopping scheduler");
                    scheduler.stop();
                }
            }

            print_json(&scheduler.get_job_history(None, 20).await)
        }
    }
}
