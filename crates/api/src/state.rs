use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use ledgerlink_engine::{
    BillPayments, ConnectionLifecycle, CreditScoringEngine, EngineContext, SyncEngine,
    WebhookProcessor,
};
use ledgerlink_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (every workflow wraps an [`EngineContext`],
/// which is itself a bundle of `Arc`s).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub lifecycle: ConnectionLifecycle,
    pub sync: SyncEngine,
    pub webhooks: WebhookProcessor,
    pub scoring: CreditScoringEngine,
    pub payments: BillPayments,
    /// Centralized event bus for publishing domain events.
    pub event_bus: Arc<EventBus>,
    /// Cancelled on shutdown; request-triggered syncs run under a child token.
    pub shutdown: CancellationToken,
    /// Background work spawned by handlers (webhook processing), awaited on shutdown.
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(config: ServerConfig, ctx: EngineContext, shutdown: CancellationToken) -> Self {
        let event_bus = ctx.events.clone();
        let lifecycle = ConnectionLifecycle::new(ctx.clone());
        Self {
            config: Arc::new(config),
            sync: SyncEngine::new(lifecycle.clone()),
            webhooks: WebhookProcessor::new(lifecycle.clone()),
            scoring: CreditScoringEngine::new(ctx),
            payments: BillPayments::new(lifecycle.clone()),
            lifecycle,
            event_bus,
            shutdown,
            tasks: TaskTracker::new(),
        }
    }
}
