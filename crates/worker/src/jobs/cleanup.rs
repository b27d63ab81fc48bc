//! Data retention.
//!
//! Each step runs independently; a failing step is logged and the others
//! still run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use ledgerlink_core::types::Timestamp;
use ledgerlink_db::store::Store;

/// Processed and failed webhook events are kept this long.
pub const WEBHOOK_EVENT_RETENTION_DAYS: i64 = 30;

/// Balance snapshots kept per connection.
pub const BALANCE_SNAPSHOTS_KEPT: i64 = 100;

/// Expired or revoked connections untouched this long are deleted.
pub const STALE_CONNECTION_DAYS: i64 = 90;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupSummary {
    pub webhook_events_deleted: u64,
    pub balances_pruned: u64,
    pub connections_deleted: u64,
}

pub async fn run(store: Arc<dyn Store>, period: Duration, cancel: CancellationToken) {
    super::every("cleanup", period, cancel, || run_and_log(store.as_ref())).await;
}

async fn run_and_log(store: &dyn Store) {
    let summary = run_once(store, Utc::now()).await;
    if summary == CleanupSummary::default() {
        tracing::debug!("Cleanup: nothing to delete");
    } else {
        tracing::info!(
            webhook_events_deleted = summary.webhook_events_deleted,
            balances_pruned = summary.balances_pruned,
            connections_deleted = summary.connections_deleted,
            "Cleanup finished"
        );
    }
}

pub async fn run_once(store: &dyn Store, now: Timestamp) -> CleanupSummary {
    let mut summary = CleanupSummary::default();

    match store
        .delete_webhook_events_before(now - chrono::Duration::days(WEBHOOK_EVENT_RETENTION_DAYS))
        .await
    {
        Ok(deleted) => summary.webhook_events_deleted = deleted,
        Err(e) => tracing::error!(error = %e, "Cleanup: webhook event purge failed"),
    }

    match store.prune_balances(BALANCE_SNAPSHOTS_KEPT).await {
        Ok(pruned) => summary.balances_pruned = pruned,
        Err(e) => tracing::error!(error = %e, "Cleanup: balance pruning failed"),
    }

    match store
        .delete_stale_connections(now - chrono::Duration::days(STALE_CONNECTION_DAYS))
        .await
    {
        Ok(deleted) => summary.connections_deleted = deleted,
        Err(e) => tracing::error!(error = %e, "Cleanup: stale connection purge failed"),
    }

    summary
}
