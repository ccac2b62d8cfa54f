//! Retry classification, backoff and volume cooldown policy

use std::time::Duration;

use crate::error::FetchError;

/// Default short pause (5 minutes)
pub const SHORT_BACKOFF: Duration = Duration::from_secs(300);

/// Default long pause (30 minutes)
pub const LONG_BACKOFF: Duration = Duration::from_secs(1800);

/// Why a failed fetch is worth retrying on the same cursor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransientKind {
    /// HTTP 503
    ServiceUnavailable,
    /// HTTP 524 (origin timeout behind the CDN)
    GatewayTimeout,
    /// HTTP 429
    RateLimited,
    /// Configured as retryable by the operator
    ExtraStatus(u16),
    /// 2xx with a body that is not JSON
    MalformedBody,
    /// Connection-level failure, no status
    Transport,
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceUnavailable => f.write_str("service unavailable"),
            Self::GatewayTimeout => f.write_str("gateway timeout"),
            Self::RateLimited => f.write_str("rate limited"),
            Self::ExtraStatus(s) => write!(f, "HTTP {s}"),
            Self::MalformedBody => f.write_str("malformed body"),
            Self::Transport => f.write_str("transport failure"),
        }
    }
}

/// Retry-in-place policy for transient fetch failures.
///
/// `max_attempts = None` retries forever; `max_backoff` caps every pause.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub short_backoff: Duration,
    pub long_backoff: Duration,
    pub max_attempts: Option<u32>,
    pub max_backoff: Option<Duration>,
    pub extra_retryable: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            short_backoff: SHORT_BACKOFF,
            long_backoff: LONG_BACKOFF,
            max_attempts: None,
            max_backoff: None,
            extra_retryable: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Classify a fetch failure. `None` means fatal: abort the run.
    pub fn classify(&self, err: &FetchError) -> Option<TransientKind> {
        match err {
            FetchError::Transport(_) => Some(TransientKind::Transport),
            FetchError::MalformedBody(_) => Some(TransientKind::MalformedBody),
            FetchError::Protocol(_) => None,
            FetchError::Status { status, .. } => match *status {
                503 => Some(TransientKind::ServiceUnavailable),
                524 => Some(TransientKind::GatewayTimeout),
                429 => Some(TransientKind::RateLimited),
                s if self.extra_retryable.contains(&s) => Some(TransientKind::ExtraStatus(s)),
                _ => None,
            },
        }
    }

    /// Pause before retrying after a failure of the given kind
    pub fn backoff(&self, kind: TransientKind) -> Duration {
        let base = match kind {
            TransientKind::ServiceUnavailable => self.long_backoff * 2,
            TransientKind::GatewayTimeout
            | TransientKind::RateLimited
            | TransientKind::ExtraStatus(_)
            | TransientKind::MalformedBody => self.long_backoff,
            TransientKind::Transport => self.short_backoff,
        };
        match self.max_backoff {
            Some(cap) => base.min(cap),
            None => base,
        }
    }

    /// Whether another attempt is allowed after `failed` consecutive failures
    pub fn allows_retry(&self, failed: u32) -> bool {
        self.max_attempts.map_or(true, |max| failed < max)
    }
}

/// Pause taken after crossing a cumulative record-count checkpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cooldown {
    Short(Duration),
    Long(Duration),
}

impl Cooldown {
    pub fn duration(self) -> Duration {
        match self {
            Self::Short(d) | Self::Long(d) => d,
        }
    }
}

/// Volume-based cooldown evaluated on the running total, not the page size
#[derive(Clone, Debug)]
pub struct CooldownPolicy {
    pub short_every: u64,
    pub long_every: u64,
    pub short: Duration,
    pub long: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            short_every: 1_000,
            long_every: 10_000,
            short: SHORT_BACKOFF,
            long: LONG_BACKOFF,
        }
    }
}

impl CooldownPolicy {
    /// Cooldown due after the total moved from `before` to `after`.
    ///
    /// A long checkpoint crossed in the same step replaces the short one.
    pub fn after(&self, before: u64, after: u64) -> Option<Cooldown> {
        let crossed = |every: u64| every > 0 && before / every != after / every;
        if crossed(self.long_every) {
            Some(Cooldown::Long(self.long))
        } else if crossed(self.short_every) {
            Some(Cooldown::Short(self.short))
        } else {
            None
        }
    }
}
