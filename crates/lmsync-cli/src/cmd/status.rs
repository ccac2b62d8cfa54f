//! Status subcommand - row counts per table

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use lmsync_core::fmt_num;
use lmsync_store::Store;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Database file (default: [database] path from config)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<u8> {
    let path = args.db.unwrap_or_else(|| config.database.path.clone());
    if !path.exists() {
        anyhow::bail!("Database not found: {}", path.display());
    }
    let store = Store::open(&path)?;

    let mut table = super::kv_table(&path.display().to_string());
    for (name, rows) in store.table_counts()? {
        table.add_row(vec![Cell::new(name), Cell::new(fmt_num(rows as usize))]);
    }
    eprintln!("\n{table}");
    Ok(0)
}
