//! Sync driver: one feed, one run, one report

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use indicatif::ProgressBar;
use lmsync_core::{CooldownPolicy, Fetcher, PageClient, RetryPolicy, RunOutcome, fmt_num};
use lmsync_store::{ConflictPolicy, Store, WriteStats};

use crate::feed::Feed;
use crate::pipeline::FeedHandler;

/// What a record that fails to map does to its page
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MappingErrorMode {
    /// Roll back the page and abort the run
    #[default]
    Abort,
    /// Log, count as dead letter, keep going
    Skip,
}

/// Everything that shapes one run
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub feed: Feed,
    pub start_url: String,
    pub retry: RetryPolicy,
    pub cooldown: CooldownPolicy,
    pub conflict_policy: ConflictPolicy,
    pub on_mapping_error: MappingErrorMode,
    /// Stop after this many committed pages
    pub max_pages: Option<usize>,
}

impl SyncConfig {
    /// Defaults for `feed` starting at `start_url`
    pub fn new(feed: Feed, start_url: impl Into<String>) -> Self {
        Self {
            feed,
            start_url: start_url.into(),
            retry: RetryPolicy::default(),
            cooldown: CooldownPolicy::default(),
            conflict_policy: feed.default_conflict_policy(),
            on_mapping_error: MappingErrorMode::default(),
            max_pages: None,
        }
    }
}

/// Borrowed resources for a run
pub struct RunContext<'a> {
    pub client: &'a dyn PageClient,
    pub store: &'a mut Store,
    pub cancel: &'a AtomicBool,
    pub progress: ProgressBar,
}

/// Outcome and counters of one run
#[derive(Debug)]
pub struct SyncReport {
    pub feed: Feed,
    pub outcome: RunOutcome,
    pub pages: usize,
    pub records_received: u64,
    pub records_persisted: u64,
    pub dead_letters: u64,
    pub writes: WriteStats,
    pub retries: u32,
    pub short_cooldowns: u32,
    pub long_cooldowns: u32,
    /// Where a later run should start to continue this one
    pub resume_cursor: Option<String>,
    pub elapsed: Duration,
}

impl SyncReport {
    /// Process exit code: 0 done or limited, 1 aborted, 130 cancelled
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            RunOutcome::Done | RunOutcome::Limited => 0,
            RunOutcome::Aborted(_) => 1,
            RunOutcome::Cancelled => 130,
        }
    }

    /// Summary as plain log lines (non-TTY)
    pub fn log(&self) {
        let feed = self.feed;
        log::info!(
            "{feed}: {} after {} pages in {:.1}s",
            self.outcome.label(),
            self.pages,
            self.elapsed.as_secs_f64()
        );
        log::info!(
            "{feed}: received {}, persisted {}, dead letters {}",
            self.records_received,
            self.records_persisted,
            self.dead_letters
        );
        log::info!(
            "{feed}: entities new {} / existing {}, related new {} / existing {}",
            self.writes.entities_applied,
            self.writes.entities_skipped,
            self.writes.related_applied,
            self.writes.related_skipped
        );
        log::info!(
            "{feed}: retries {}, cooldowns short {} / long {}",
            self.retries,
            self.short_cooldowns,
            self.long_cooldowns
        );
        if let RunOutcome::Aborted(reason) = &self.outcome {
            log::error!("{feed}: {reason}");
        }
        if let Some(cursor) = &self.resume_cursor {
            log::info!("{feed}: resume with --start-url '{cursor}'");
        }
    }

    /// Summary as a table (TTY)
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(format!("Sync: {}", self.feed))
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        let outcome_color = match self.outcome {
            RunOutcome::Done => Color::Green,
            RunOutcome::Limited => Color::Cyan,
            RunOutcome::Aborted(_) => Color::Red,
            RunOutcome::Cancelled => Color::Yellow,
        };
        table.add_row(vec![
            Cell::new("Outcome"),
            Cell::new(self.outcome.label()).fg(outcome_color),
        ]);
        table.add_row(vec![Cell::new("Pages"), Cell::new(fmt_num(self.pages))]);
        table.add_row(vec![
            Cell::new("Records received"),
            Cell::new(fmt_num(self.records_received as usize)),
        ]);
        table.add_row(vec![
            Cell::new("Records persisted"),
            Cell::new(fmt_num(self.records_persisted as usize)),
        ]);
        if self.dead_letters > 0 {
            table.add_row(vec![
                Cell::new("Dead letters"),
                Cell::new(fmt_num(self.dead_letters as usize)).fg(Color::Yellow),
            ]);
        }
        table.add_row(vec![
            Cell::new("Entities new / existing"),
            Cell::new(format!(
                "{} / {}",
                fmt_num(self.writes.entities_applied),
                fmt_num(self.writes.entities_skipped)
            )),
        ]);
        table.add_row(vec![
            Cell::new("Related rows new / existing"),
            Cell::new(format!(
                "{} / {}",
                fmt_num(self.writes.related_applied),
                fmt_num(self.writes.related_skipped)
            )),
        ]);
        table.add_row(vec![Cell::new("Retries"), Cell::new(self.retries)]);
        table.add_row(vec![
            Cell::new("Cooldowns short / long"),
            Cell::new(format!("{} / {}", self.short_cooldowns, self.long_cooldowns)),
        ]);
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
        ]);
        if let RunOutcome::Aborted(reason) = &self.outcome {
            table.add_row(vec![Cell::new("Reason"), Cell::new(reason).fg(Color::Red)]);
        }
        if let Some(cursor) = &self.resume_cursor {
            table.add_row(vec![Cell::new("Resume from"), Cell::new(cursor)]);
        }
        table.to_string()
    }
}

/// Run one feed from `config.start_url` until the chain ends, a fatal
/// error aborts it, the page limit is reached, or `cancel` is raised.
pub fn run(config: &SyncConfig, ctx: RunContext<'_>) -> SyncReport {
    let feed = config.feed;
    log::info!(
        "{feed}: starting at {} (on conflict: {}, invalid records: {:?})",
        config.start_url,
        config.conflict_policy,
        config.on_mapping_error
    );

    let mut handler = FeedHandler::new(
        feed,
        ctx.store,
        config.conflict_policy,
        config.on_mapping_error,
    );
    let summary = Fetcher::new(
        ctx.client,
        config.retry.clone(),
        config.cooldown.clone(),
        ctx.cancel,
    )
    .label(feed.name())
    .progress(ctx.progress)
    .max_pages(config.max_pages)
    .run(&config.start_url, &mut handler);

    SyncReport {
        feed,
        outcome: summary.outcome,
        pages: summary.pages,
        records_received: summary.records_received,
        records_persisted: summary.records_persisted,
        dead_letters: handler.dead_letters(),
        writes: handler.writes(),
        retries: summary.retries,
        short_cooldowns: summary.short_cooldowns,
        long_cooldowns: summary.long_cooldowns,
        resume_cursor: summary.resume_cursor,
        elapsed: summary.elapsed,
    }
}
