//! Sync subcommand - walk one feed and persist every page

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use lmsync_core::{BasicAuthClient, SharedProgress, install_signal_handlers, shutdown_flag};
use lmsync_feeds::{Feed, MappingErrorMode, RunContext, SyncConfig};
use lmsync_store::{ConflictPolicy, Store};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Feed to sync
    #[arg(value_enum)]
    pub feed: FeedArg,

    /// Start from this page URL instead of the first page (resume point)
    #[arg(long)]
    pub start_url: Option<String>,

    /// Stop after this many committed pages
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Skip records that fail to map instead of aborting the run
    #[arg(long)]
    pub skip_invalid: bool,

    /// Behavior when a course or activity row already exists (default: per feed)
    #[arg(long, value_enum)]
    pub on_conflict: Option<ConflictArg>,

    /// Database file (default: [database] path from config)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum FeedArg {
    Courses,
    Activity,
}

impl From<FeedArg> for Feed {
    fn from(f: FeedArg) -> Self {
        match f {
            FeedArg::Courses => Feed::Courses,
            FeedArg::Activity => Feed::Activity,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum ConflictArg {
    Ignore,
    Update,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(c: ConflictArg) -> Self {
        match c {
            ConflictArg::Ignore => ConflictPolicy::Ignore,
            ConflictArg::Update => ConflictPolicy::Update,
        }
    }
}

pub fn run(args: SyncArgs, config: &Config, progress: &SharedProgress) -> Result<u8> {
    let feed = Feed::from(args.feed);

    let start_url = match args.start_url {
        Some(url) => url,
        None => feed.start_url(&config.api.endpoint()?),
    };
    let client = BasicAuthClient::new(config.api.credentials()?, config.http.to_http_config())
        .context("Failed to build HTTP client")?;

    let db_path = args.db.unwrap_or_else(|| config.database.path.clone());
    let mut store = Store::open(&db_path)?;
    install_signal_handlers().context("Failed to install signal handlers")?;

    let sync_config = SyncConfig {
        feed,
        start_url,
        retry: config.retry.policy(),
        cooldown: config.cooldown.policy(),
        conflict_policy: args
            .on_conflict
            .map_or_else(|| feed.default_conflict_policy(), ConflictPolicy::from),
        on_mapping_error: if args.skip_invalid {
            MappingErrorMode::Skip
        } else {
            MappingErrorMode::Abort
        },
        max_pages: args.limit,
    };

    log::info!("Syncing {feed} into {}", db_path.display());
    let report = lmsync_feeds::run(
        &sync_config,
        RunContext {
            client: &client,
            store: &mut store,
            cancel: shutdown_flag(),
            progress: progress.feed_line(feed.name()),
        },
    );

    if progress.is_tty() {
        eprintln!("\n{}", report.format_table());
    } else {
        report.log();
    }
    Ok(report.exit_code())
}
