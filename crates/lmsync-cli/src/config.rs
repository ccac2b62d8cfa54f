//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use lmsync_core::{CooldownPolicy, Credentials, HttpConfig, RetryPolicy};
use lmsync_feeds::Endpoint;
use serde::Deserialize;

/// Largest page the API serves
pub const MAX_PAGE_SIZE: u32 = 20;

/// Global configuration for lmsync
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub cooldown: CooldownConfig,
    pub http: HttpSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./lmsync.duckdb"),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub account_name: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub account_id: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub client_key: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub client_secret: Option<String>,
    /// May contain `{account_name}`
    pub base_url: String,
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            account_name: std::env::var("LMS_ACCOUNT_NAME").ok(),
            account_id: std::env::var("LMS_ACCOUNT_ID").ok(),
            client_key: std::env::var("LMS_CLIENT_KEY").ok(),
            client_secret: std::env::var("LMS_CLIENT_SECRET").ok(),
            base_url: "https://{account_name}.udemy.com/api-2.0".to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("account_name", &self.account_name)
            .field("account_id", &self.account_id)
            .field("client_key", &self.client_key)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl ApiConfig {
    /// `base_url` with the account name substituted
    pub fn resolved_base_url(&self) -> Result<String> {
        if !self.base_url.contains("{account_name}") {
            return Ok(self.base_url.clone());
        }
        let name = self
            .account_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .context("api.account_name is not set (config file or LMS_ACCOUNT_NAME)")?;
        Ok(self.base_url.replace("{account_name}", name))
    }

    /// Page size clamped to what the API serves
    pub fn effective_page_size(&self) -> u32 {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            log::warn!(
                "api.page_size {} out of range, using {MAX_PAGE_SIZE}",
                self.page_size
            );
            return MAX_PAGE_SIZE;
        }
        self.page_size
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        let account_id = self
            .account_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .context("api.account_id is not set (config file or LMS_ACCOUNT_ID)")?;
        Ok(Endpoint::new(
            self.resolved_base_url()?,
            account_id,
            self.effective_page_size(),
        ))
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let key = self
            .client_key
            .clone()
            .filter(|s| !s.is_empty())
            .context("api.client_key is not set (config file or LMS_CLIENT_KEY)")?;
        let secret = self
            .client_secret
            .clone()
            .filter(|s| !s.is_empty())
            .context("api.client_secret is not set (config file or LMS_CLIENT_SECRET)")?;
        Ok(Credentials { key, secret })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub short_backoff_secs: u64,
    pub long_backoff_secs: u64,
    pub max_attempts: Option<u32>,
    pub max_backoff_secs: Option<u64>,
    pub extra_retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            short_backoff_secs: 300,
            long_backoff_secs: 1800,
            max_attempts: None,
            max_backoff_secs: None,
            extra_retryable_statuses: Vec::new(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            short_backoff: Duration::from_secs(self.short_backoff_secs),
            long_backoff: Duration::from_secs(self.long_backoff_secs),
            max_attempts: self.max_attempts,
            max_backoff: self.max_backoff_secs.map(Duration::from_secs),
            extra_retryable: self.extra_retryable_statuses.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub short_every: u64,
    pub long_every: u64,
    pub short_secs: u64,
    pub long_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            short_every: 1000,
            long_every: 10_000,
            short_secs: 300,
            long_secs: 1800,
        }
    }
}

impl CooldownConfig {
    pub fn policy(&self) -> CooldownPolicy {
        CooldownPolicy {
            short_every: self.short_every,
            long_every: self.long_every,
            short: Duration::from_secs(self.short_secs),
            long: Duration::from_secs(self.long_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            request_timeout_secs: 120,
        }
    }
}

impl HttpSection {
    pub fn to_http_config(self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from `path`, or from default locations
    ///
    /// Search order:
    /// 1. ./lmsync.toml (current directory)
    /// 2. ~/.config/lmsync/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let local_config = PathBuf::from("lmsync.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "lmsync") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from("./lmsync.duckdb"));
        assert_eq!(config.api.page_size, 20);
        assert_eq!(config.retry.short_backoff_secs, 300);
        assert_eq!(config.retry.max_attempts, None);
        assert_eq!(config.cooldown.long_every, 10_000);
        assert_eq!(config.http.request_timeout_secs, 120);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("LMSYNC_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${LMSYNC_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("LMSYNC_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        std::env::set_var("LMSYNC_TEST_SECRET", "s3cret");
        let toml = r#"
[database]
path = "/tmp/lms.duckdb"

[api]
account_name = "acme"
account_id = "1234"
client_key = "key"
client_secret = "${LMSYNC_TEST_SECRET}"
page_size = 10

[retry]
max_attempts = 5
extra_retryable_statuses = [502]

[cooldown]
short_every = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        std::env::remove_var("LMSYNC_TEST_SECRET");

        assert_eq!(config.database.path, PathBuf::from("/tmp/lms.duckdb"));
        assert_eq!(config.api.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.long_backoff_secs, 1800);
        assert_eq!(config.retry.policy().extra_retryable, vec![502]);
        assert_eq!(config.cooldown.short_every, 0);
        assert_eq!(config.cooldown.long_every, 10_000);

        let endpoint = config.api.endpoint().unwrap();
        assert_eq!(endpoint.base_url, "https://acme.udemy.com/api-2.0");
        assert_eq!(endpoint.account_id, "1234");
        assert_eq!(endpoint.page_size, 10);
    }

    #[test]
    fn page_size_is_clamped() {
        let api = ApiConfig {
            page_size: 500,
            ..Default::default()
        };
        assert_eq!(api.effective_page_size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn missing_credentials_are_errors() {
        let api = ApiConfig {
            client_key: None,
            client_secret: Some("x".to_string()),
            ..Default::default()
        };
        let err = api.credentials().unwrap_err();
        assert!(err.to_string().contains("client_key"));
    }

    #[test]
    fn missing_account_name_is_an_error() {
        let api = ApiConfig {
            account_name: None,
            account_id: Some("1".to_string()),
            ..Default::default()
        };
        assert!(api.endpoint().is_err());

        let explicit = ApiConfig {
            account_name: None,
            base_url: "http://localhost:8080/api-2.0".to_string(),
            ..api
        };
        assert_eq!(
            explicit.resolved_base_url().unwrap(),
            "http://localhost:8080/api-2.0"
        );
    }

    #[test]
    fn debug_masks_secret() {
        let api = ApiConfig {
            client_secret: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert!(!format!("{api:?}").contains("hunter2"));
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[http]\nconnect_timeout_secs = 5\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.http.connect_timeout_secs, 5);
        assert_eq!(config.http.request_timeout_secs, 120);

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
