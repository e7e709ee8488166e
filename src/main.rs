//! Brewlearn - personalization and learning core for brew recommendations
//!
//! Command-line entry point: ingest feedback, compose overlays, manage
//! flags and the practice curriculum, and run edge maintenance.

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use cli::curriculum::{CurriculumCommands, PracticeCommands};
use cli::flags::FlagsCommands;
use cli::maintain::MaintainCommands;
use cli::suggest::SuggestArgs;

#[derive(Parser)]
#[command(name = "brewlearn")]
#[command(about = "Learns brewing preferences and composes bounded recipe overlays", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Data directory (overrides the config file and default)
    #[arg(long, env = "BREWLEARN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a feedback payload (JSON file, or `-` for stdin)
    Feedback {
        #[arg(short, long, default_value = "-")]
        file: String,
    },

    /// Compose the overlay for a user and goals
    Suggest(SuggestArgs),

    /// Show the last explanation served to a user
    Explain {
        #[arg(short, long)]
        user: String,
    },

    /// Feature flag management
    Flags {
        #[command(subcommand)]
        command: FlagsCommands,
    },

    /// Spaced-repetition skill curriculum
    Curriculum {
        #[command(subcommand)]
        command: CurriculumCommands,
    },

    /// Focus practice mode
    Practice {
        #[command(subcommand)]
        command: PracticeCommands,
    },

    /// Learning progress, warmup state and top preferences
    Progress {
        #[arg(short, long)]
        user: String,

        /// Preferences listed per variable
        #[arg(long, default_value = "5")]
        top: usize,
    },

    /// Cross-user alignment, learning gain and calibration
    Metrics,

    /// Check the overlay clip rate
    Watchdog,

    /// Edge maintenance and offline evaluation
    Maintain {
        #[command(subcommand)]
        command: MaintainCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let level = level.as_str().to_lowercase();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!(
            "brewlearn={},brewlearn_core={}",
            level, level
        )))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Brewlearn v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = cli::helpers::load_config(cli.config.as_deref(), cli.data_dir)?;
    let engine = cli::helpers::open_engine(config)?;

    match cli.command {
        Commands::Feedback { file } => cli::feedback::handle(&engine, &file),
        Commands::Suggest(args) => cli::suggest::handle(&engine, args),
        Commands::Explain { user } => cli::suggest::explain(&engine, &user),
        Commands::Flags { command } => cli::flags::handle(&engine, command),
        Commands::Curriculum { command } => cli::curriculum::handle(&engine, command),
        Commands::Practice { command } => cli::curriculum::handle_practice(&engine, command),
        Commands::Progress { user, top } => cli::curriculum::progress(&engine, &user, top),
        Commands::Metrics => cli::helpers::print_json(&engine.global_progress()),
        Commands::Watchdog => cli::helpers::print_json(&engine.watchdog()?),
        Commands::Maintain { command } => cli::maintain::handle(&engine, command).await,
    }
}
