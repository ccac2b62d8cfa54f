//! lmsync core - shared plumbing for paginated API sync pipelines
//!
//! This crate provides the HTTP page client, failure classification,
//! retry/cooldown policy and the cursor-driven fetch loop. It knows nothing
//! about individual feeds or the storage schema.

pub mod error;
pub mod http;
pub mod logging;
pub mod paginate;
pub mod progress;
pub mod retry;
pub mod shutdown;

// Re-exports for convenience
pub use error::FetchError;
pub use http::{BasicAuthClient, Credentials, HttpConfig, HttpResponse, PageClient, SHARED_RUNTIME};
pub use logging::{IndicatifLogger, init_logging};
pub use paginate::{
    AbortReason, FetchSummary, Fetcher, Page, PageHandler, RunOutcome, RunState,
};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{Cooldown, CooldownPolicy, RetryPolicy, TransientKind};
pub use shutdown::{
    install_signal_handlers, is_shutdown_requested, request_shutdown, shutdown_flag,
    sleep_unless_cancelled,
};
