//! lmsync-feeds - course catalog and user-course-activity feeds
//!
//! Maps raw API records into store write-sets and drives a sync run:
//! fetch loop → per-page mapping → one transaction per page.
//!
//! # Example
//!
//! ```ignore
//! use lmsync_feeds::{Endpoint, Feed, RunContext, SyncConfig, run};
//!
//! let endpoint = Endpoint::new("https://acme.udemy.com/api-2.0", "42", 20);
//! let config = SyncConfig::new(Feed::Courses, Feed::Courses.start_url(&endpoint));
//! let report = run(&config, ctx);
//! println!("{} records", report.records_persisted);
//! ```

pub mod driver;
pub mod feed;
pub mod mapper;
pub mod pipeline;
pub mod timestamp;

// Re-exports
pub use driver::{MappingErrorMode, RunContext, SyncConfig, SyncReport, run};
pub use feed::{Endpoint, Feed};
pub use mapper::MapError;
pub use pipeline::FeedHandler;
