//! Re-run webhook events whose processing failed.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use ledgerlink_engine::WebhookProcessor;

pub async fn run(processor: WebhookProcessor, period: Duration, cancel: CancellationToken) {
    super::every("webhook_retry", period, cancel, || run_once(&processor)).await;
}

pub async fn run_once(processor: &WebhookProcessor) {
    match processor.retry_failed(Utc::now()).await {
        Ok(summary) if summary.attempted == 0 => {
            tracing::debug!("Webhook retry: no failed events");
        }
        Ok(summary) => tracing::info!(
            attempted = summary.attempted,
            completed = summary.completed,
            failed = summary.failed,
            "Webhook retry sweep finished"
        ),
        Err(e) => tracing::error!(error = %e, "Webhook retry sweep failed"),
    }
}
