//! Provider webhook intake.
//!
//! Deliveries are verified and recorded synchronously, then processed on a
//! background task so the provider gets its acknowledgement immediately.
//! Failed processing is picked up later by the worker's retry sweep.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use ledgerlink_engine::webhook::{CONSENT_STATUS_EVENT, TRANSFER_STATUS_EVENT};
use ledgerlink_engine::{Recorded, WebhookHeaders};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /webhooks/open_banking/consent_status
pub async fn consent_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    receive(state, CONSENT_STATUS_EVENT, &headers, &body).await
}

/// POST /webhooks/open_banking/transfer_status
pub async fn transfer_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    receive(state, TRANSFER_STATUS_EVENT, &headers, &body).await
}

async fn receive(
    state: AppState,
    event_type: &'static str,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<Json<Value>> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let webhook_headers = WebhookHeaders {
        idempotency_key: header("idempotency_key"),
        authorization: header("authorization"),
        signature: header("signature"),
    };
    state.webhooks.verify(&webhook_headers)?;

    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?;
    let event_id = payload
        .get("event_id")
        .or_else(|| payload.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let recorded = state
        .webhooks
        .record(
            event_type,
            event_id.as_deref(),
            webhook_headers.idempotency_key,
            payload,
        )
        .await?;

    let event = match recorded {
        Recorded::New(event) => event,
        Recorded::Duplicate => {
            tracing::debug!(event_type, "Duplicate webhook delivery ignored");
            return Ok(Json(json!({ "status": "duplicate" })));
        }
    };

    tracing::info!(
        webhook_event_id = event.id,
        event_type,
        "Webhook recorded",
    );

    let processor = state.webhooks.clone();
    let id = event.id;
    state.tasks.spawn(async move {
        match processor.process(id).await {
            Ok(status) => tracing::debug!(webhook_event_id = id, %status, "Webhook processed"),
            Err(e) => tracing::error!(webhook_event_id = id, error = %e, "Webhook processing error"),
        }
    });

    Ok(Json(json!({ "status": "accepted", "event_id": event.event_id })))
}
