//! Failure type for a single page fetch

/// Error from fetching and decoding one page of a paginated feed.
///
/// Whether a variant is retried is decided by [`RetryPolicy`](crate::RetryPolicy),
/// not here: the same HTTP status can be transient for one API and fatal for
/// another.
#[derive(Debug)]
pub enum FetchError {
    /// No HTTP status was received (connect failure, reset, timeout)
    Transport(String),
    /// Non-2xx HTTP status
    Status { status: u16, url: String },
    /// 2xx response whose body is not valid JSON
    MalformedBody(String),
    /// Valid JSON that breaks the page contract (missing `results`, bad `next`)
    Protocol(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Status { status, url } => write!(f, "HTTP {status} from {url}"),
            Self::MalformedBody(msg) => write!(f, "malformed response body: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Build a transport error from reqwest, dropping the URL and any auth detail
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            "timed out"
        } else if e.is_connect() {
            "connect failed"
        } else if e.is_body() || e.is_decode() {
            "body read failed"
        } else {
            "request failed"
        };
        Self::Transport(kind.to_string())
    }

    /// HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
