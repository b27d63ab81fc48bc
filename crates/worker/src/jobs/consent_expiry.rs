//! Expire connections whose consent deadline has passed.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use ledgerlink_engine::ConnectionLifecycle;

pub async fn run(lifecycle: ConnectionLifecycle, period: Duration, cancel: CancellationToken) {
    super::every("consent_expiry", period, cancel, || run_once(&lifecycle)).await;
}

pub async fn run_once(lifecycle: &ConnectionLifecycle) {
    match lifecycle.expire_lapsed_consents(Utc::now()).await {
        Ok(0) => tracing::debug!("Consent expiry: nothing lapsed"),
        Ok(expired) => tracing::info!(expired, "Consent expiry: connections expired"),
        Err(e) => tracing::error!(error = %e, "Consent expiry sweep failed"),
    }
}
