use std::time::Duration;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Period of the full sync sweep (default: 4 h).
    pub sync_interval: Duration,
    /// Period of the token refresh and consent expiry sweeps (default: 15 min).
    pub token_refresh_interval: Duration,
    /// Period of the failed-webhook retry sweep (default: 10 min).
    pub webhook_retry_interval: Duration,
    /// Period of the cleanup job (default: 24 h).
    pub cleanup_interval: Duration,
    /// Syncs allowed to run at once (default: `4`).
    pub max_concurrent_syncs: usize,
    /// How long running syncs get to stop after shutdown (default: `30` s).
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `SYNC_INTERVAL_SECS`          | `14400` |
    /// | `TOKEN_REFRESH_INTERVAL_SECS` | `900`   |
    /// | `WEBHOOK_RETRY_INTERVAL_SECS` | `600`   |
    /// | `CLEANUP_INTERVAL_SECS`       | `86400` |
    /// | `MAX_CONCURRENT_SYNCS`        | `4`     |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`    |
    pub fn from_env() -> Self {
        let max_concurrent_syncs: usize = std::env::var("MAX_CONCURRENT_SYNCS")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("MAX_CONCURRENT_SYNCS must be a valid usize");

        Self {
            sync_interval: secs("SYNC_INTERVAL_SECS", 14_400),
            token_refresh_interval: secs("TOKEN_REFRESH_INTERVAL_SECS", 900),
            webhook_retry_interval: secs("WEBHOOK_RETRY_INTERVAL_SECS", 600),
            cleanup_interval: secs("CLEANUP_INTERVAL_SECS", 86_400),
            max_concurrent_syncs: max_concurrent_syncs.max(1),
            shutdown_timeout: secs("SHUTDOWN_TIMEOUT_SECS", 30),
        }
    }
}

fn secs(name: &str, default: u64) -> Duration {
    let value: u64 = match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid number of seconds")),
        Err(_) => default,
    };
    Duration::from_secs(value.max(1))
}
