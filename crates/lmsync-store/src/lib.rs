//! lmsync-store: idempotent upsert sink over DuckDB
//!
//! Write-sets produced by the feed mappers are applied inside one
//! transaction per page. Natural keys are the only guard against
//! duplication, so every insert carries an explicit conflict clause.

pub mod rows;
pub mod schema;
pub mod sink;

pub use rows::{
    ActivityRow, CourseRow, CourseWrite, LookupTable, RelatedRow, TitledRef, WriteSet,
};
pub use sink::{ConflictPolicy, PageTx, Store, WriteOutcome, WriteStats, is_write_conflict};
