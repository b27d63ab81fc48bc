use std::time::Duration;

use ledgerlink_core::signing::Credentials;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Provider connection settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct OpenBankingConfig {
    /// Provider API root, without a trailing slash.
    pub base_url: String,
    pub credentials: Credentials,
    /// Per-request timeout (default: 30 s).
    pub timeout: Duration,
    /// Minimum spacing between provider calls (default: 250 ms).
    pub min_request_interval: Duration,
}

impl OpenBankingConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                                | Default    |
    /// |----------------------------------------|------------|
    /// | `OPEN_BANKING_BASE_URL`                | (required) |
    /// | `OPEN_BANKING_CLIENT_ID`               | (required) |
    /// | `OPEN_BANKING_CLIENT_SECRET`           | (required) |
    /// | `OPEN_BANKING_TIMEOUT_SECS`            | `30`       |
    /// | `OPEN_BANKING_MIN_REQUEST_INTERVAL_MS` | `250`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = required("OPEN_BANKING_BASE_URL")?;
        let client_id = required("OPEN_BANKING_CLIENT_ID")?;
        let client_secret = required("OPEN_BANKING_CLIENT_SECRET")?;
        let timeout_secs = parsed("OPEN_BANKING_TIMEOUT_SECS", 30)?;
        let interval_ms = parsed("OPEN_BANKING_MIN_REQUEST_INTERVAL_MS", 250)?;

        Ok(Self::new(base_url, Credentials::new(client_id, client_secret))
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_min_request_interval(Duration::from_millis(interval_ms)))
    }

    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            timeout: Duration::from_secs(30),
            min_request_interval: Duration::from_millis(250),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
