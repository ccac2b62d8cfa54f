//! Subcommands. Each returns the process exit status on success; an `Err`
//! is a setup failure (configuration, database, client).

pub mod schema;
pub mod status;
pub mod sync;

use anyhow::Result;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

/// Key-value table with a cyan header
pub(crate) fn kv_table(title: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    table
}

fn mask(value: Option<&str>) -> &'static str {
    match value {
        Some(s) if !s.is_empty() => "configured",
        _ => "not set",
    }
}

/// Print the effective configuration, secrets masked
pub fn show_config(config: &Config) -> Result<u8> {
    let api = &config.api;
    let retry = &config.retry;
    let cooldown = &config.cooldown;

    let mut table = kv_table("Setting");
    table.add_row(vec![
        "Database".to_string(),
        config.database.path.display().to_string(),
    ]);
    table.add_row(vec![
        "Base URL".to_string(),
        api.resolved_base_url()
            .unwrap_or_else(|_| api.base_url.clone()),
    ]);
    table.add_row(vec![
        "Account ID".to_string(),
        api.account_id.clone().unwrap_or_else(|| "not set".to_string()),
    ]);
    table.add_row(vec![
        "Client key".to_string(),
        mask(api.client_key.as_deref()).to_string(),
    ]);
    table.add_row(vec![
        "Client secret".to_string(),
        mask(api.client_secret.as_deref()).to_string(),
    ]);
    table.add_row(vec!["Page size".to_string(), api.page_size.to_string()]);
    table.add_row(vec![
        "Backoff short / long".to_string(),
        format!("{}s / {}s", retry.short_backoff_secs, retry.long_backoff_secs),
    ]);
    table.add_row(vec![
        "Max attempts".to_string(),
        retry
            .max_attempts
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
    ]);
    table.add_row(vec![
        "Max backoff".to_string(),
        retry
            .max_backoff_secs
            .map_or_else(|| "none".to_string(), |s| format!("{s}s")),
    ]);
    if !retry.extra_retryable_statuses.is_empty() {
        table.add_row(vec![
            "Extra retryable".to_string(),
            format!("{:?}", retry.extra_retryable_statuses),
        ]);
    }
    table.add_row(vec![
        "Cooldown short".to_string(),
        format!("{}s every {} records", cooldown.short_secs, cooldown.short_every),
    ]);
    table.add_row(vec![
        "Cooldown long".to_string(),
        format!("{}s every {} records", cooldown.long_secs, cooldown.long_every),
    ]);
    table.add_row(vec![
        "Timeouts connect / request".to_string(),
        format!(
            "{}s / {}s",
            config.http.connect_timeout_secs, config.http.request_timeout_secs
        ),
    ]);

    eprintln!("\n{table}");
    Ok(0)
}
