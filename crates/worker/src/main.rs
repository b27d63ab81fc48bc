use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerlink_core::token_cipher::TokenCipher;
use ledgerlink_db::store::PgStore;
use ledgerlink_engine::EngineContext;
use ledgerlink_events::{EventBus, LogNotifier, NotificationRouter};
use ledgerlink_openbanking::{OpenBankingClient, OpenBankingConfig};
use ledgerlink_worker::config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerlink_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(?config, "Worker starting");

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = ledgerlink_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    ledgerlink_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    let provider_config = OpenBankingConfig::from_env()?;
    let credentials = provider_config.credentials.clone();
    let client = OpenBankingClient::new(provider_config)?;
    let tokens = TokenCipher::from_hex(
        &std::env::var("TOKEN_ENCRYPTION_KEY").context("TOKEN_ENCRYPTION_KEY must be set")?,
    )?;

    let event_bus = Arc::new(EventBus::default());
    let router_handle = tokio::spawn(NotificationRouter::run(
        Arc::new(LogNotifier),
        event_bus.subscribe(),
    ));

    let ctx = EngineContext::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(client),
        tokens,
        credentials,
        event_bus.clone(),
    );

    let cancel = CancellationToken::new();
    let jobs = ledgerlink_worker::start(&config, ctx, cancel.clone());

    shutdown_signal().await;
    cancel.cancel();

    // Running syncs stop before their next account.
    let drain = async {
        for handle in jobs.handles {
            let _ = handle.await;
        }
        jobs.scheduler.tasks().close();
        jobs.scheduler.tasks().wait().await;
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        tracing::warn!("Jobs still running at shutdown timeout");
    }

    drop(event_bus);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), router_handle).await;

    pool.close().await;
    tracing::info!("Worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
