use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerlink_api::config::ServerConfig;
use ledgerlink_api::router::build_app_router;
use ledgerlink_api::state::AppState;
use ledgerlink_core::token_cipher::TokenCipher;
use ledgerlink_db::store::PgStore;
use ledgerlink_engine::EngineContext;
use ledgerlink_events::{EventBus, LogNotifier, NotificationRouter};
use ledgerlink_openbanking::{OpenBankingClient, OpenBankingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerlink_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = config.port, "Loaded server configuration");

    // --- Persistence ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = ledgerlink_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    ledgerlink_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    ledgerlink_db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database ready");

    // --- Provider ---
    let provider_config = OpenBankingConfig::from_env()?;
    let credentials = provider_config.credentials.clone();
    let client = OpenBankingClient::new(provider_config)?;
    let tokens = TokenCipher::from_hex(
        &std::env::var("TOKEN_ENCRYPTION_KEY").context("TOKEN_ENCRYPTION_KEY must be set")?,
    )?;

    // --- Events ---
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

    let shutdown = CancellationToken::new();
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let addr = config.bind_address();
    let state = AppState::new(config, ctx, shutdown.clone());
    let tasks = state.tasks.clone();
    let app = build_app_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // In-flight syncs stop before their next account.
    shutdown.cancel();

    tasks.close();
    if tokio::time::timeout(shutdown_timeout, tasks.wait()).await.is_err() {
        tracing::warn!(
            pending = tasks.len(),
            "Webhook processing still running at shutdown; the retry sweep picks up abandoned events once stale"
        );
    }

    // Dropping the last sender closes the broadcast channel and stops the
    // notification router.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), router_handle).await;

    pool.close().await;
    tracing::info!("Shutdown complete");
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
