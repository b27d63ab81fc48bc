//! Periodic sync of every active connection.
//!
//! [`SyncScheduler`] bounds how many syncs run at once across the whole
//! worker: the sweep and the syncs queued by the refresh job share the same
//! permits. Accounts inside one connection still sync one after another.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use ledgerlink_core::status::ConnectionStatus;
use ledgerlink_core::types::DbId;
use ledgerlink_db::store::{Store, StoreError};
use ledgerlink_engine::{ConnectionLifecycle, EngineContext, SyncEngine, SyncReport};

/// Totals from one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub connections: usize,
    pub synced: usize,
    pub failed: usize,
    pub transactions_inserted: u64,
}

#[derive(Clone)]
pub struct SyncScheduler {
    store: Arc<dyn Store>,
    sync: SyncEngine,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub fn new(ctx: EngineContext, max_concurrent: usize, cancel: CancellationToken) -> Self {
        Self {
            store: ctx.store.clone(),
            sync: SyncEngine::new(ConnectionLifecycle::new(ctx)),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: TaskTracker::new(),
            cancel,
        }
    }

    /// Syncs queued with [`schedule`](Self::schedule) that may still be running.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Queue a background sync for one connection.
    pub fn schedule(&self, connection_id: DbId) {
        let this = self.clone();
        self.tasks.spawn(async move {
            this.sync_one(connection_id).await;
        });
    }

    /// Sync every active connection and wait for all of them.
    pub async fn sweep(&self) -> Result<SweepSummary, StoreError> {
        let connections = self
            .store
            .list_connections_by_status(ConnectionStatus::Active)
            .await?;

        let mut summary = SweepSummary {
            connections: connections.len(),
            ..SweepSummary::default()
        };

        let mut set = JoinSet::new();
        for connection in connections {
            let this = self.clone();
            set.spawn(async move { this.sync_one(connection.id).await });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(report)) if report.accounts_failed.is_empty() && !report.aborted => {
                    summary.synced += 1;
                    summary.transactions_inserted += report.transactions_inserted;
                }
                Ok(Some(report)) => {
                    summary.failed += 1;
                    summary.transactions_inserted += report.transactions_inserted;
                }
                Ok(None) => summary.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Sync task panicked");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn sync_one(&self, connection_id: DbId) -> Option<SyncReport> {
        let _permit = self.permits.clone().acquire_owned().await.ok()?;
        if self.cancel.is_cancelled() {
            return None;
        }

        match self.sync.sync_connection(connection_id, &self.cancel).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(connection_id, error = %e, "Scheduled sync failed");
                None
            }
        }
    }
}

pub async fn run(scheduler: SyncScheduler, period: Duration, cancel: CancellationToken) {
    super::every("sync_sweep", period, cancel, || run_once(&scheduler)).await;
}

pub async fn run_once(scheduler: &SyncScheduler) {
    match scheduler.sweep().await {
        Ok(summary) if summary.connections == 0 => {
            tracing::debug!("Sync sweep: no active connections");
        }
        Ok(summary) => tracing::info!(
            connections = summary.connections,
            synced = summary.synced,
            failed = summary.failed,
            transactions_inserted = summary.transactions_inserted,
            "Sync sweep finished"
        ),
        Err(e) => tracing::error!(error = %e, "Sync sweep failed"),
    }
}
