//! Cursor-driven page loop with retry-in-place and volume cooldowns.
//!
//! State machine for one run:
//!
//! ```text
//! Fetching ──ok──▶ Processing ──next──▶ Fetching
//!    │  ▲                │
//!    │  └──transient─────┤ (same cursor, after backoff)
//!    ▼                   ▼
//! Finished(Aborted)   Finished(Done | Limited | Cancelled)
//! ```
//!
//! One page is one unit of work: the handler commits it or fails it whole.
//! Committed pages are never revisited within a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::http::PageClient;
use crate::progress::fmt_num;
use crate::retry::{Cooldown, CooldownPolicy, RetryPolicy};
use crate::shutdown::sleep_unless_cancelled;

/// One decoded response page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Records in response order
    pub results: Vec<Value>,
    /// Absolute URL of the next page; `None` ends the run
    pub next: Option<String>,
    /// Total record count reported by the API, when present
    pub count: Option<u64>,
}

#[derive(Deserialize)]
struct RawPage {
    results: Vec<Value>,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    count: Option<u64>,
}

impl Page {
    /// Decode a 2xx body.
    ///
    /// Invalid JSON is [`FetchError::MalformedBody`] (retryable); valid JSON
    /// that lacks `results` or carries an unusable `next` is
    /// [`FetchError::Protocol`] (fatal).
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| FetchError::MalformedBody(e.to_string()))?;
        let raw: RawPage =
            serde_json::from_value(value).map_err(|e| FetchError::Protocol(e.to_string()))?;
        if raw.next.as_deref() == Some("") {
            return Err(FetchError::Protocol("empty `next` cursor".to_string()));
        }
        Ok(Self {
            results: raw.results,
            next: raw.next,
            count: raw.count,
        })
    }
}

/// Per-page callback: write every record of the page as one unit.
///
/// Returns the number of records persisted. An `Err` aborts the run; the
/// handler is responsible for leaving nothing of the failed page behind.
pub trait PageHandler {
    fn handle_page(&mut self, records: &[Value]) -> anyhow::Result<usize>;
}

impl<F> PageHandler for F
where
    F: FnMut(&[Value]) -> anyhow::Result<usize>,
{
    fn handle_page(&mut self, records: &[Value]) -> anyhow::Result<usize> {
        self(records)
    }
}

/// Why a run stopped early
#[derive(Debug)]
pub enum AbortReason {
    /// Failure classified fatal (non-retryable status, protocol violation)
    Fatal(FetchError),
    /// Transient failures on one cursor exceeded the attempt budget
    RetriesExhausted { attempts: u32, last: FetchError },
    /// The page handler failed (mapping or persistence)
    Handler(anyhow::Error),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal(e) => write!(f, "{e}"),
            Self::RetriesExhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            Self::Handler(e) => write!(f, "{e:#}"),
        }
    }
}

/// Terminal state of a run
#[derive(Debug)]
pub enum RunOutcome {
    /// Cursor chain exhausted
    Done,
    /// Stopped at the configured page limit
    Limited,
    /// Stopped on a fatal failure
    Aborted(AbortReason),
    /// Stopped by the shutdown flag
    Cancelled,
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Done => "DONE",
            Self::Limited => "LIMITED",
            Self::Aborted(_) => "ABORTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done | Self::Limited)
    }
}

/// Loop state
#[derive(Debug)]
pub enum RunState {
    Fetching,
    Processing(Page),
    Finished(RunOutcome),
}

/// Counters for one run
#[derive(Debug)]
pub struct FetchSummary {
    pub outcome: RunOutcome,
    /// Pages handed to the handler and committed
    pub pages: usize,
    /// Records received in committed pages
    pub records_received: u64,
    /// Records the handler reported as persisted
    pub records_persisted: u64,
    /// Transient failures retried in place
    pub retries: u32,
    pub short_cooldowns: u32,
    pub long_cooldowns: u32,
    /// First page not committed; restart point for a later run
    pub resume_cursor: Option<String>,
    pub elapsed: Duration,
}

/// Drives a cursor chain to completion or fatal termination
pub struct Fetcher<'a> {
    client: &'a dyn PageClient,
    retry: RetryPolicy,
    cooldown: CooldownPolicy,
    cancel: &'a AtomicBool,
    progress: ProgressBar,
    label: String,
    max_pages: Option<usize>,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        client: &'a dyn PageClient,
        retry: RetryPolicy,
        cooldown: CooldownPolicy,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            client,
            retry,
            cooldown,
            cancel,
            progress: ProgressBar::hidden(),
            label: "sync".to_string(),
            max_pages: None,
        }
    }

    /// Prefix for log lines
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Status line updated after every page
    pub fn progress(mut self, pb: ProgressBar) -> Self {
        self.progress = pb;
        self
    }

    /// Stop after this many committed pages
    pub fn max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn fetch_page(&self, url: &str) -> Result<Page, FetchError> {
        let resp = self.client.get(url)?;
        if !resp.is_success() {
            return Err(FetchError::Status {
                status: resp.status,
                url: url.to_string(),
            });
        }
        Page::parse(&resp.body)
    }

    /// Walk the chain starting at `start_url`, handing each page to `handler`.
    pub fn run(&self, start_url: &str, handler: &mut dyn PageHandler) -> FetchSummary {
        let start = Instant::now();
        let label = &self.label;
        let mut summary = FetchSummary {
            outcome: RunOutcome::Done,
            pages: 0,
            records_received: 0,
            records_persisted: 0,
            retries: 0,
            short_cooldowns: 0,
            long_cooldowns: 0,
            resume_cursor: None,
            elapsed: Duration::ZERO,
        };

        let mut cursor = start_url.to_string();
        let mut visited: FxHashSet<String> = FxHashSet::default();
        visited.insert(cursor.clone());
        let mut failures = 0u32;
        let mut state = RunState::Fetching;

        let outcome = loop {
            state = match state {
                RunState::Fetching => {
                    if self.cancelled() {
                        RunState::Finished(RunOutcome::Cancelled)
                    } else {
                        log::debug!("{label}: GET {cursor}");
                        match self.fetch_page(&cursor) {
                            Ok(page) => {
                                failures = 0;
                                RunState::Processing(page)
                            }
                            Err(e) => self.on_fetch_error(e, &mut failures, &mut summary),
                        }
                    }
                }
                RunState::Processing(page) => {
                    self.process_page(page, &mut cursor, &mut visited, handler, &mut summary)
                }
                RunState::Finished(outcome) => break outcome,
            };
        };

        if !matches!(outcome, RunOutcome::Done) {
            summary.resume_cursor = Some(cursor);
        }
        summary.outcome = outcome;
        summary.elapsed = start.elapsed();
        self.progress.finish_and_clear();
        summary
    }

    fn on_fetch_error(
        &self,
        err: FetchError,
        failures: &mut u32,
        summary: &mut FetchSummary,
    ) -> RunState {
        let label = &self.label;
        let Some(kind) = self.retry.classify(&err) else {
            log::error!("{label}: {err}");
            return RunState::Finished(RunOutcome::Aborted(AbortReason::Fatal(err)));
        };

        *failures += 1;
        if !self.retry.allows_retry(*failures) {
            log::error!("{label}: {kind} on attempt {failures}, giving up: {err}");
            return RunState::Finished(RunOutcome::Aborted(AbortReason::RetriesExhausted {
                attempts: *failures,
                last: err,
            }));
        }

        summary.retries += 1;
        let pause = self.retry.backoff(kind);
        log::warn!(
            "{label}: {kind} (attempt {failures}), retrying same page in {}s: {err}",
            pause.as_secs()
        );
        self.progress
            .set_message(format!("{kind}, retry {failures} in {}s", pause.as_secs()));
        if sleep_unless_cancelled(pause, self.cancel) {
            RunState::Fetching
        } else {
            RunState::Finished(RunOutcome::Cancelled)
        }
    }

    fn process_page(
        &self,
        page: Page,
        cursor: &mut String,
        visited: &mut FxHashSet<String>,
        handler: &mut dyn PageHandler,
        summary: &mut FetchSummary,
    ) -> RunState {
        let label = &self.label;

        if let Some(next) = &page.next {
            if !visited.insert(next.clone()) {
                let err = FetchError::Protocol(format!("`next` cursor revisits {next}"));
                log::error!("{label}: {err}");
                return RunState::Finished(RunOutcome::Aborted(AbortReason::Fatal(err)));
            }
        }
        log::debug!("{label}: next page link: {:?}", page.next);

        let persisted = match handler.handle_page(&page.results) {
            Ok(n) => n,
            Err(e) => {
                log::error!("{label}: page at {cursor} rolled back: {e:#}");
                return RunState::Finished(RunOutcome::Aborted(AbortReason::Handler(e)));
            }
        };

        let before = summary.records_received;
        summary.pages += 1;
        summary.records_received += page.results.len() as u64;
        summary.records_persisted += persisted as u64;
        log::info!(
            "{label}: page {} committed, {} records so far",
            summary.pages,
            fmt_num(summary.records_received as usize)
        );
        self.progress.set_message(match page.count {
            Some(total) => format!(
                "page {} · {}/{} records",
                summary.pages,
                fmt_num(summary.records_received as usize),
                fmt_num(total as usize)
            ),
            None => format!(
                "page {} · {} records",
                summary.pages,
                fmt_num(summary.records_received as usize)
            ),
        });

        let Some(next) = page.next else {
            return RunState::Finished(RunOutcome::Done);
        };
        *cursor = next;

        if let Some(cooldown) = self.cooldown.after(before, summary.records_received) {
            match cooldown {
                Cooldown::Short(_) => summary.short_cooldowns += 1,
                Cooldown::Long(_) => summary.long_cooldowns += 1,
            }
            let pause = cooldown.duration();
            log::info!(
                "{label}: cooldown after {} records, pausing {} minutes",
                fmt_num(summary.records_received as usize),
                pause.as_secs() / 60
            );
            self.progress
                .set_message(format!("cooldown {}m", pause.as_secs() / 60));
            if !sleep_unless_cancelled(pause, self.cancel) {
                return RunState::Finished(RunOutcome::Cancelled);
            }
        }

        if self.max_pages.is_some_and(|max| summary.pages >= max) {
            log::info!("{label}: page limit reached");
            return RunState::Finished(RunOutcome::Limited);
        }
        if self.cancelled() {
            return RunState::Finished(RunOutcome::Cancelled);
        }
        RunState::Fetching
    }
}
