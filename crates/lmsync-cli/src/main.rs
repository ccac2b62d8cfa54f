//! lmsync - incremental sync of learning-platform API feeds into DuckDB
//!
//! Walks the course catalog and user-course-activity feeds page by page and
//! upserts every record, one transaction per page.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

/// Exit status for configuration and connection failures at startup
const EXIT_SETUP_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "lmsync")]
#[command(about = "Incremental sync of learning-platform API feeds into DuckDB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Config file path (default: ./lmsync.toml or ~/.config/lmsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Maximum consecutive attempts per page before aborting (default: unbounded)
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Upper bound in seconds for any single backoff pause
    #[arg(long, global = true)]
    max_backoff: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Sync one feed into the database
    Sync(cmd::sync::SyncArgs),
    /// Create tables and sequences (idempotent)
    Schema(cmd::schema::SchemaArgs),
    /// Show row counts per table
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(lmsync_core::ProgressContext::new());

    // Logging: TTY lines go through the progress bars, otherwise plain timestamped lines
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    lmsync_core::init_logging(cli.quiet, cli.debug, multi);

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(EXIT_SETUP_FAILURE);
        }
    };

    // CLI overrides
    if let Some(max) = cli.max_retries {
        config.retry.max_attempts = Some(max);
    }
    if let Some(secs) = cli.max_backoff {
        config.retry.max_backoff_secs = Some(secs);
    }

    let result = match cli.command {
        Command::Sync(args) => cmd::sync::run(args, &config, &progress),
        Command::Schema(args) => cmd::schema::run(args, &config),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Config => cmd::show_config(&config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(EXIT_SETUP_FAILURE)
        }
    }
}
