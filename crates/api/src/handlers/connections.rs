//! Handlers for bank connections: device-flow authorization, token
//! maintenance, sync and bill payments.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use ledgerlink_core::types::DbId;
use ledgerlink_db::models::bank_connection::{BankConnection, CreateBankConnection};
use ledgerlink_engine::{BillPaymentRequest, PollOutcome};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PollParams {
    /// Code typed by the user, for providers that ask for it.
    pub user_input: Option<String>,
}

/// Body of a poll response.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollResponse {
    Active { connection: BankConnection },
    Pending { retry_after_secs: u64 },
    SlowDown { retry_after_secs: u64 },
}

/// POST /api/v1/connections
///
/// Start the device authorization flow for a new bank account.
pub async fn initiate(
    State(state): State<AppState>,
    Json(input): Json<CreateBankConnection>,
) -> AppResult<impl IntoResponse> {
    if input.account_number.trim().is_empty() {
        return Err(AppError::BadRequest("account_number must not be empty".into()));
    }
    if input.bank_code.trim().is_empty() {
        return Err(AppError::BadRequest("bank_code must not be empty".into()));
    }

    let started = state.lifecycle.initiate(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: started })))
}

/// GET /api/v1/connections/{id}
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let connection = state.lifecycle.load(id).await?;
    Ok(Json(DataResponse { data: connection }))
}

/// POST /api/v1/connections/{id}/poll
///
/// Poll once for the device-flow token. Still-pending polls answer 202
/// with the number of seconds to wait before the next attempt.
pub async fn poll(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<PollParams>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .lifecycle
        .poll(id, params.user_input.as_deref())
        .await?;

    let (status, body) = match outcome {
        PollOutcome::Active(connection) => (StatusCode::OK, PollResponse::Active { connection }),
        PollOutcome::Pending { retry_after } => (
            StatusCode::ACCEPTED,
            PollResponse::Pending {
                retry_after_secs: retry_after.as_secs(),
            },
        ),
        PollOutcome::SlowDown { retry_after } => (
            StatusCode::ACCEPTED,
            PollResponse::SlowDown {
                retry_after_secs: retry_after.as_secs(),
            },
        ),
    };
    Ok((status, Json(DataResponse { data: body })))
}

/// POST /api/v1/connections/{id}/reauthorize
///
/// Start a fresh device flow for an expired, revoked or failed connection.
pub async fn reauthorize(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let started = state.lifecycle.reauthorize(id).await?;
    Ok(Json(DataResponse { data: started }))
}

/// POST /api/v1/connections/{id}/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let connection = state.lifecycle.refresh(id).await?;
    Ok(Json(DataResponse { data: connection }))
}

/// POST /api/v1/connections/{id}/revoke
pub async fn revoke(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let connection = state.lifecycle.revoke(id).await?;
    tracing::info!(connection_id = id, "Bank connection revoked");
    Ok(Json(DataResponse { data: connection }))
}

/// DELETE /api/v1/connections/{id}
///
/// Revoke at the provider when still active, then delete the connection.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    state.lifecycle.remove(id).await?;
    tracing::info!(connection_id = id, "Bank connection removed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/connections/{id}/sync
///
/// Sync the connection now and return the report. Per-account failures
/// are part of a successful response.
pub async fn sync(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.shutdown.child_token();
    let report = state.sync.sync_connection(id, &cancel).await?;
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/connections/{id}/bill_payments
///
/// Pay a bill from the connected account. The payment is recorded with
/// the provider's reference; later status changes arrive by webhook.
pub async fn pay_bill(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<BillPaymentRequest>,
) -> AppResult<impl IntoResponse> {
    if input.biller_id.trim().is_empty() || input.bill_reference.trim().is_empty() {
        return Err(AppError::BadRequest(
            "biller_id and bill_reference must not be empty".into(),
        ));
    }

    let payment = state.payments.pay_bill(id, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: payment })))
}
