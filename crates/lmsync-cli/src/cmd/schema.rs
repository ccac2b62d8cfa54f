//! Schema subcommand - create tables without syncing

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use lmsync_store::Store;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Database file (default: [database] path from config)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub fn run(args: SchemaArgs, config: &Config) -> Result<u8> {
    let path = args.db.unwrap_or_else(|| config.database.path.clone());
    // opening bootstraps the schema
    Store::open(&path)?;
    log::info!("Schema ready in {}", path.display());
    Ok(0)
}
