//! nuflows CLI — orchestrates training, export, plotting, and batch
//! submission for neutrino-flow runs.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// nuflows: run orchestration for neutrino momentum regression
#[derive(Parser, Debug)]
#[command(name = "nuflows", version, about, long_about = None)]
struct Cli {
    /// Repository root (overrides the NUFLOWS_ROOT environment variable)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Configuration overrides as dotted key=value pairs
    #[arg(short = 'o', long = "override", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train then export in one gated sequence
    Run {
        /// Project namespace
        #[arg(short, long)]
        project: Option<String>,
        /// Run identifier within the project
        #[arg(short, long)]
        run: Option<String>,
        /// RNG seed forwarded to the trainer
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Train a model
    Train {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long)]
        run: Option<String>,
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Export posterior samples from a trained checkpoint
    Export {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long)]
        run: Option<String>,
        /// Posterior samples drawn per event
        #[arg(long)]
        samples_per_event: Option<usize>,
    },
    /// Produce comparison figures from exported candidates
    Plot {
        #[arg(short, long)]
        project: Option<String>,
        #[arg(short, long)]
        run: Option<String>,
    },
    /// Submit a batch of randomized-seed runs to the queue manager
    Submit {
        /// Project namespace for the submitted runs
        #[arg(short, long, default_value = nuflows_core::submit::DEFAULT_PROJECT)]
        project: String,
        /// Queue manager submit command
        #[arg(long, default_value = "sbatch")]
        queue_cmd: String,
    },
    /// Dataset utilities
    Data {
        #[command(subcommand)]
        action: DataAction,
    },
    /// Inspect the composed configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum DataAction {
    /// Verify a dataset file exists and report how a run would load it
    Check {
        /// Path to the dataset file
        file: PathBuf,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the fully composed run configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("io", "nuflows", "nuflows")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "nuflows.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli).await
}
