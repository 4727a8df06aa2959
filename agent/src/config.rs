//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration. Everything is defaulted so the agent starts with
/// no environment at all (sync stays disabled until `SYNC_BASE_URL` is
/// set).
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote sync endpoint base URL (`SYNC_BASE_URL`), trailing slashes
    /// stripped. `None` disables sync entirely.
    pub base_url: Option<String>,
    /// Static auth token sent as `x-sync-token` (`SYNC_TOKEN`).
    pub token: Option<String>,
    /// Directory holding collection files and sync bookkeeping
    /// (`DATA_DIR`, default `./data`).
    pub data_dir: PathBuf,
    /// Interval between sync cycles (`SYNC_PULL_INTERVAL_MS`, default 3s).
    pub pull_interval: Duration,
    /// Per-request HTTP timeout (`SYNC_TIMEOUT_MS`, default 5s).
    pub request_timeout: Duration,
    /// Sync queue capacity (`SYNC_QUEUE_MAX`, default 200).
    pub queue_max: usize,
    /// Base delay for the dns-failure backoff (`SYNC_RETRY_BASE_MS`,
    /// default 5s).
    pub retry_base: Duration,
    /// Cap for the dns-failure backoff (`SYNC_RETRY_MAX_MS`, default 60s).
    pub retry_max: Duration,
    /// Cooldown between storefront order alerts
    /// (`NEW_ORDER_NOTIFY_COOLDOWN_MS`, default 2s).
    pub notify_cooldown: Duration,
    /// Whether storefront order alerts fire at all (`SYNC_NOTIFICATIONS`,
    /// default on).
    pub notifications_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env::var("SYNC_BASE_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let token = env::var("SYNC_TOKEN").ok().filter(|t| !t.is_empty());

        let data_dir = env::var("DATA_DIR")
            .ok()
            .map(|dir| dir.trim().to_string())
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        Ok(Self {
            base_url,
            token,
            data_dir,
            pull_interval: millis_var("SYNC_PULL_INTERVAL_MS", 3_000)?,
            request_timeout: millis_var("SYNC_TIMEOUT_MS", 5_000)?,
            queue_max: usize_var("SYNC_QUEUE_MAX", 200)?,
            retry_base: millis_var("SYNC_RETRY_BASE_MS", 5_000)?,
            retry_max: millis_var("SYNC_RETRY_MAX_MS", 60_000)?,
            notify_cooldown: millis_var("NEW_ORDER_NOTIFY_COOLDOWN_MS", 2_000)?,
            notifications_enabled: bool_var("SYNC_NOTIFICATIONS", true)?,
        })
    }

    /// Whether a remote is configured at all.
    pub fn sync_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

fn millis_var(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidNumber { name }),
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

fn usize_var(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        Err(_) => Ok(default),
    }
}

fn bool_var(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim() {
            "1" | "true" | "on" => Ok(true),
            "0" | "false" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool { name }),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid numeric value for {name}")]
    InvalidNumber { name: &'static str },

    #[error("invalid boolean value for {name} (use 1/0, true/false, on/off)")]
    InvalidBool { name: &'static str },
}
