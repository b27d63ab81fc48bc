//! Ledgerlink background worker.
//!
//! Runs the periodic jobs that keep connections healthy and data current:
//!
//! - [`jobs::sync_sweep`]: sync every active connection, with bounded
//!   concurrency.
//! - [`jobs::token_refresh`]: refresh tokens that are about to expire and
//!   schedule a sync for each refreshed connection.
//! - [`jobs::consent_expiry`]: expire connections whose consent lapsed.
//! - [`jobs::webhook_retry`]: re-run failed webhook events.
//! - [`jobs::cleanup`]: drop old webhook events, balance snapshots and
//!   dead connections.

pub mod config;
pub mod jobs;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ledgerlink_engine::{ConnectionLifecycle, EngineContext, WebhookProcessor};

use crate::config::WorkerConfig;
use crate::jobs::sync_sweep::SyncScheduler;

/// Handles of the running job loops.
pub struct RunningJobs {
    pub handles: Vec<JoinHandle<()>>,
    /// Owns the syncs scheduled by the sweep and the refresh job.
    pub scheduler: SyncScheduler,
}

/// Spawn every job loop. They all stop when `cancel` fires.
pub fn start(config: &WorkerConfig, ctx: EngineContext, cancel: CancellationToken) -> RunningJobs {
    let lifecycle = ConnectionLifecycle::new(ctx.clone());
    let scheduler = SyncScheduler::new(ctx.clone(), config.max_concurrent_syncs, cancel.clone());
    let webhooks = WebhookProcessor::new(lifecycle.clone());

    let handles = vec![
        tokio::spawn(jobs::sync_sweep::run(
            scheduler.clone(),
            config.sync_interval,
            cancel.clone(),
        )),
        tokio::spawn(jobs::token_refresh::run(
            lifecycle.clone(),
            scheduler.clone(),
            config.token_refresh_interval,
            cancel.clone(),
        )),
        // Consent deadlines are checked on the refresh cadence.
        tokio::spawn(jobs::consent_expiry::run(
            lifecycle,
            config.token_refresh_interval,
            cancel.clone(),
        )),
        tokio::spawn(jobs::webhook_retry::run(
            webhooks,
            config.webhook_retry_interval,
            cancel.clone(),
        )),
        tokio::spawn(jobs::cleanup::run(
            ctx.store.clone(),
            config.cleanup_interval,
            cancel,
        )),
    ];

    RunningJobs { handles, scheduler }
}
