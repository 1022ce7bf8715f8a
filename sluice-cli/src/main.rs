mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sluice",
    version,
    about = "Pipeline orchestration engine for incremental transactional-data ETL"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a pipeline run from a pipeline document
    Run {
        /// Path to the pipeline JSON document
        pipeline: PathBuf,
        /// Bounded window start (RFC 3339); requires --window-end
        #[arg(long)]
        window_start: Option<DateTime<Utc>>,
        /// Bounded window end (RFC 3339); requires --window-start
        #[arg(long)]
        window_end: Option<DateTime<Utc>>,
        /// Do not block on the outcome; final status is reported through
        /// monitoring events only
        #[arg(long)]
        no_wait: bool,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
        /// Override the worker pool size
        #[arg(long)]
        workers: Option<usize>,
        /// Watermark state file (in-memory when omitted)
        #[arg(long)]
        watermarks: Option<PathBuf>,
        /// Checkpoint directory (in-memory when omitted)
        #[arg(long)]
        checkpoints: Option<PathBuf>,
    },
    /// Validate a pipeline document without dispatching anything
    Validate {
        /// Path to the pipeline JSON document
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            pipeline,
            window_start,
            window_end,
            no_wait,
            json,
            workers,
            watermarks,
            checkpoints,
        } => {
            commands::run::execute(commands::run::RunArgs {
                pipeline,
                window_start,
                window_end,
                no_wait,
                json,
                workers,
                watermarks,
                checkpoints,
            })
            .await
        }
        Commands::Validate { pipeline } => commands::validate::execute(&pipeline),
    }
}
