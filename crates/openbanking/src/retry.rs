//! Bounded retries for provider calls.
//!
//! Rate-limited calls back off from a long base delay and escalate across
//! calls that share a context key, so a connection that keeps hitting 429s
//! waits longer each time. Server-side failures (5xx, timeouts, transport
//! errors) back off per attempt only. Everything else fails immediately.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ledgerlink_core::backoff::{compute_backoff, random_jitter};

use crate::error::ProviderError;

/// Retry limits and backoff bases.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt, shared by both error classes.
    pub max_retries: u32,
    pub rate_limit_base: Duration,
    pub server_error_base: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_base: Duration::from_secs(60),
            server_error_base: Duration::from_secs(300),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ContextState {
    failures: u32,
    last_delay: Duration,
}

/// Rate-limit failure counters keyed by context, e.g.
/// `sync:42:0123456789:transactions`.
#[derive(Debug, Default)]
pub struct RateLimitState {
    contexts: Mutex<HashMap<String, ContextState>>,
}

impl RateLimitState {
    /// Consecutive rate-limit failures recorded for `context`.
    pub fn failures(&self, context: &str) -> u32 {
        self.lock().get(context).map_or(0, |s| s.failures)
    }

    fn reset(&self, context: &str) {
        self.lock().remove(context);
    }

    /// Record one more failure and return the delay to wait before retrying.
    fn escalate(&self, context: &str, config: &RetryConfig, retry_after: Option<Duration>) -> Duration {
        let mut contexts = self.lock();
        let state = contexts.entry(context.to_string()).or_default();
        let computed = compute_backoff(
            config.rate_limit_base,
            state.failures,
            random_jitter(),
            config.min_delay,
            config.max_delay,
        );
        let hinted = retry_after.map_or(Duration::ZERO, |d| d.min(config.max_delay));
        let delay = computed.max(state.last_delay).max(hinted);
        state.failures = state.failures.saturating_add(1);
        state.last_delay = delay;
        delay
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ContextState>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wraps provider calls with the retry rules above.
///
/// Clones share the same [`RateLimitState`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
    state: Arc<RateLimitState>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            state: Arc::new(RateLimitState::default()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn state(&self) -> &RateLimitState {
        &self.state
    }

    /// Delay before the next retry of a rate-limited call in `context`.
    ///
    /// Counts as a failure for that context.
    pub fn next_rate_limit_delay(&self, context: &str, retry_after: Option<Duration>) -> Duration {
        self.state.escalate(context, &self.config, retry_after)
    }

    /// Delay before retry number `attempt` (0-based) of a server-side failure.
    pub fn server_error_delay(&self, attempt: u32) -> Duration {
        compute_backoff(
            self.config.server_error_base,
            attempt,
            random_jitter(),
            self.config.min_delay,
            self.config.max_delay,
        )
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, context: &str, op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.run_inner(context, None, op).await
    }

    /// Like [`run`](Self::run), but abandons backoff sleeps when `cancel`
    /// fires, returning [`ProviderError::Cancelled`].
    pub async fn run_with_cancel<T, F, Fut>(
        &self,
        context: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.run_inner(context, Some(cancel), op).await
    }

    async fn run_inner<T, F, Fut>(
        &self,
        context: &str,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut retries = 0u32;
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(ProviderError::Cancelled);
            }

            let err = match op().await {
                Ok(value) => {
                    self.state.reset(context);
                    return Ok(value);
                }
                Err(err) => err,
            };

            let delay = match &err {
                ProviderError::RateLimited { retry_after, .. } => {
                    let delay = self.next_rate_limit_delay(context, *retry_after);
                    if retries >= self.config.max_retries {
                        tracing::warn!(context, retries, "Rate limit retries exhausted");
                        return Err(err);
                    }
                    delay
                }
                e if e.is_server_side() => {
                    if retries >= self.config.max_retries {
                        tracing::warn!(context, retries, error = %e, "Provider retries exhausted");
                        return Err(err);
                    }
                    self.server_error_delay(retries)
                }
                _ => return Err(err),
            };

            retries += 1;
            tracing::warn!(
                context,
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying provider call",
            );

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(ProviderError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}
