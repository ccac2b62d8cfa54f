//! Page handler: map every record, then persist the page as one transaction

use anyhow::Context;
use lmsync_core::PageHandler;
use lmsync_store::{ConflictPolicy, Store, WriteStats, is_write_conflict};
use serde_json::Value;

use crate::driver::MappingErrorMode;
use crate::feed::Feed;
use crate::mapper;

/// Persists pages of one feed into the store.
///
/// A page commits all its writes or none. In [`MappingErrorMode::Skip`] a
/// record that fails to map writes nothing and is counted as a dead letter;
/// the rest of the page still commits. A page that loses a write race to
/// another writer is re-run once.
pub struct FeedHandler<'s> {
    feed: Feed,
    store: &'s mut Store,
    policy: ConflictPolicy,
    on_mapping_error: MappingErrorMode,
    dead_letters: u64,
    writes: WriteStats,
}

impl<'s> FeedHandler<'s> {
    pub fn new(
        feed: Feed,
        store: &'s mut Store,
        policy: ConflictPolicy,
        on_mapping_error: MappingErrorMode,
    ) -> Self {
        Self {
            feed,
            store,
            policy,
            on_mapping_error,
            dead_letters: 0,
            writes: WriteStats::default(),
        }
    }

    /// Records skipped in committed pages
    pub fn dead_letters(&self) -> u64 {
        self.dead_letters
    }

    /// Row counters over committed pages
    pub fn writes(&self) -> WriteStats {
        self.writes
    }

    /// Map and write one page in a fresh transaction.
    ///
    /// Returns `(persisted, skipped)` after the commit.
    fn write_page(&mut self, records: &[Value]) -> anyhow::Result<(usize, u64)> {
        let feed = self.feed;
        let mut tx = self.store.begin_page()?;
        let mut persisted = 0;
        let mut skipped = 0;

        for (idx, record) in records.iter().enumerate() {
            let write = match feed.map(record) {
                Ok(w) => w,
                Err(e) => match self.on_mapping_error {
                    MappingErrorMode::Abort => {
                        return Err(anyhow::Error::new(e).context(format!(
                            "{feed}: record {idx} ({}) could not be mapped",
                            mapper::describe(record)
                        )));
                    }
                    MappingErrorMode::Skip => {
                        log::warn!(
                            "{feed}: skipping record {idx} ({}): {e}",
                            mapper::describe(record)
                        );
                        skipped += 1;
                        continue;
                    }
                },
            };
            // persistence errors fail the page in either mode
            tx.apply(&write, self.policy)
                .with_context(|| format!("{feed}: failed to persist {}", write.key()))?;
            persisted += 1;
        }

        let stats = tx.commit()?;
        self.writes.merge(stats);
        log::debug!(
            "{feed}: page persisted {persisted}, skipped {skipped}, entities new {} / existing {}",
            stats.entities_applied,
            stats.entities_skipped
        );
        Ok((persisted, skipped))
    }
}

/// Run `attempt`, and once more if it lost a write race to another writer.
fn rerun_on_conflict<T>(
    label: &str,
    mut attempt: impl FnMut() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    match attempt() {
        Err(e) if is_write_conflict(&e) => {
            log::warn!("{label}: page lost a write race, re-running it: {e:#}");
            attempt()
        }
        other => other,
    }
}

impl PageHandler for FeedHandler<'_> {
    fn handle_page(&mut self, records: &[Value]) -> anyhow::Result<usize> {
        let label = self.feed.name();
        let (persisted, skipped) = rerun_on_conflict(label, || self.write_page(records))?;
        self.dead_letters += skipped;
        Ok(persisted)
    }
}
