//! Blocking page client over async reqwest.
//!
//! Uses a shared tokio runtime internally but presents a sync interface:
//! the fetch loop is strictly serial, one request in flight at a time.

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::FetchError;

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Client timeouts
#[derive(Clone, Copy, Debug)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// HTTP Basic credential pair (API client key and secret)
#[derive(Clone)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"***")
            .finish()
    }
}

/// Status and body of one GET, whatever the status
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Source of pages. Non-2xx statuses are returned as `Ok`; only failures
/// without a status are `Err`.
pub trait PageClient {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// reqwest-backed client that authenticates every request with Basic auth
pub struct BasicAuthClient {
    client: reqwest::Client,
    credentials: Credentials,
}

impl BasicAuthClient {
    pub fn new(credentials: Credentials, config: HttpConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(concat!("lmsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

impl PageClient for BasicAuthClient {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        SHARED_RUNTIME.handle().block_on(async {
            let resp = self
                .client
                .get(url)
                .basic_auth(&self.credentials.key, Some(&self.credentials.secret))
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(&e))?;
            let status = resp.status().as_u16();
            let body = resp.text().await.map_err(|e| FetchError::from_reqwest(&e))?;
            Ok(HttpResponse { status, body })
        })
    }
}
