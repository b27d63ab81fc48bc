//! Refresh tokens before they expire.
//!
//! Only connections synced within the last week are kept warm; idle ones
//! refresh lazily on their next sync. Each refreshed connection gets a sync
//! scheduled right away.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use ledgerlink_engine::ConnectionLifecycle;

use super::sync_sweep::SyncScheduler;

pub async fn run(
    lifecycle: ConnectionLifecycle,
    scheduler: SyncScheduler,
    period: Duration,
    cancel: CancellationToken,
) {
    super::every("token_refresh", period, cancel, || run_once(&lifecycle, &scheduler)).await;
}

/// Refresh every due connection and return how many were refreshed.
pub async fn run_once(lifecycle: &ConnectionLifecycle, scheduler: &SyncScheduler) -> usize {
    match lifecycle.refresh_due(Utc::now()).await {
        Ok(refreshed) => {
            if refreshed.is_empty() {
                tracing::debug!("Token refresh: nothing due");
            } else {
                tracing::info!(refreshed = refreshed.len(), "Token refresh: tokens renewed");
            }
            for id in &refreshed {
                scheduler.schedule(*id);
            }
            refreshed.len()
        }
        Err(e) => {
            tracing::error!(error = %e, "Token refresh sweep failed");
            0
        }
    }
}
