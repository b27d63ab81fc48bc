//! Per-user handlers: connection listing, direct sync and credit scoring.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use ledgerlink_core::types::DbId;
use ledgerlink_db::models::credit_score::CreditScore;
use ledgerlink_db::store::Store;
use ledgerlink_engine::{ScoringError, UserSyncSummary};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// A direct sync only re-scores when it brought in at least this many rows.
pub const RESCORE_MIN_INSERTED: u64 = 10;

/// Longest scoring window accepted over HTTP, in months.
const MAX_SCORING_MONTHS: u32 = 36;

#[derive(Debug, Deserialize)]
pub struct ScoreParams {
    pub months: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UserSyncResponse {
    pub sync: UserSyncSummary,
    pub credit_score: Option<CreditScore>,
    /// Why re-scoring after the sync did not produce a score.
    pub scoring_error: Option<String>,
}

/// GET /api/v1/users/{id}/connections
pub async fn list_connections(
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let connections = state
        .lifecycle
        .context()
        .store
        .list_user_connections(user_id)
        .await?;
    Ok(Json(DataResponse { data: connections }))
}

/// POST /api/v1/users/{id}/sync
///
/// Sync every active connection of the user, then re-score when enough
/// new transactions arrived.
pub async fn sync_user(
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.shutdown.child_token();
    let summary = state.sync.sync_user(user_id, &cancel).await?;

    let (credit_score, scoring_error) = if summary.transactions_inserted >= RESCORE_MIN_INSERTED {
        match state.scoring.calculate(user_id, None).await {
            Ok(score) => (Some(score), None),
            Err(e @ ScoringError::InsufficientData { .. }) => (None, Some(e.to_string())),
            Err(e) => {
                tracing::error!(user_id, error = %e, "Scoring after sync failed");
                (None, Some("Credit score calculation failed".to_string()))
            }
        }
    } else {
        (None, None)
    };

    Ok(Json(DataResponse {
        data: UserSyncResponse {
            sync: summary,
            credit_score,
            scoring_error,
        },
    }))
}

/// POST /api/v1/users/{id}/credit_score
///
/// Compute a score now. Answers 422 when there is not enough history.
pub async fn calculate_credit_score(
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
    Query(params): Query<ScoreParams>,
) -> AppResult<impl IntoResponse> {
    if let Some(months) = params.months {
        if months == 0 || months > MAX_SCORING_MONTHS {
            return Err(AppError::BadRequest(format!(
                "months must be between 1 and {MAX_SCORING_MONTHS}"
            )));
        }
    }

    let score = state.scoring.calculate(user_id, params.months).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: score })))
}

/// GET /api/v1/users/{id}/credit_score
pub async fn latest_credit_score(
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let score = state
        .scoring
        .latest(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No credit score for user {user_id}")))?;
    Ok(Json(DataResponse { data: score }))
}
