use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use ledgerlink_db::store::StoreError;
use ledgerlink_engine::{LifecycleError, PaymentError, ScoringError, SyncError, WebhookError};
use ledgerlink_openbanking::ProviderError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the engine's workflow errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
/// Provider failures are reported with their safe user-facing message,
/// never the raw provider body.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A missing resource with a human-readable message.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Lifecycle(err) => classify_lifecycle(err),
            AppError::Sync(err) => match err {
                SyncError::NotActive { .. } => {
                    (StatusCode::CONFLICT, "CONNECTION_NOT_ACTIVE", err.to_string())
                }
                SyncError::Lifecycle(inner) => classify_lifecycle(inner),
                SyncError::Provider(inner) => classify_provider(inner),
                SyncError::Store(inner) => classify_store(inner),
            },
            AppError::Webhook(err) => classify_webhook(err),
            AppError::Scoring(err) => match err {
                ScoringError::InsufficientData { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INSUFFICIENT_DATA",
                    err.to_string(),
                ),
                ScoringError::UserNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                ScoringError::Failed(reason) => {
                    tracing::error!(error = %reason, "Credit scoring failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "SCORING_FAILED",
                        "Credit score calculation failed. Please try again later.".to_string(),
                    )
                }
            },
            AppError::Payment(err) => match err {
                PaymentError::NotActive { .. } => {
                    (StatusCode::CONFLICT, "CONNECTION_NOT_ACTIVE", err.to_string())
                }
                PaymentError::InvalidAmount => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                PaymentError::Lifecycle(inner) => classify_lifecycle(inner),
                PaymentError::Provider(inner) => classify_provider(inner),
                PaymentError::Store(inner) => classify_store(inner),
            },
            AppError::Store(err) => classify_store(err),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal(err: &dyn std::fmt::Display, context: &'static str) -> Classified {
    tracing::error!(error = %err, "{context}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_lifecycle(err: &LifecycleError) -> Classified {
    match err {
        LifecycleError::ConnectionNotFound(_) | LifecycleError::UserNotFound(_) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        LifecycleError::Duplicate => (StatusCode::CONFLICT, "DUPLICATE_CONNECTION", err.to_string()),
        LifecycleError::InvalidState { .. } => {
            (StatusCode::CONFLICT, "INVALID_STATE", err.to_string())
        }
        LifecycleError::AuthorizationExpired => {
            (StatusCode::GONE, "AUTHORIZATION_EXPIRED", err.to_string())
        }
        LifecycleError::AccessDenied => (StatusCode::FORBIDDEN, "ACCESS_DENIED", err.to_string()),
        LifecycleError::MissingToken(_) => (
            StatusCode::CONFLICT,
            "RECONNECT_REQUIRED",
            "This connection has no valid authorization. Please reconnect your account."
                .to_string(),
        ),
        LifecycleError::Provider(inner) => classify_provider(inner),
        LifecycleError::Cipher(inner) => internal(inner, "Token cipher error"),
        LifecycleError::Store(inner) => classify_store(inner),
    }
}

/// Provider failures keep their status class but only ever expose
/// [`ProviderError::user_message`].
fn classify_provider(err: &ProviderError) -> Classified {
    let (status, code) = match err {
        ProviderError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "PROVIDER_REJECTED"),
        ProviderError::Unauthorized { .. } | ProviderError::Forbidden { .. } => {
            (StatusCode::CONFLICT, "RECONNECT_REQUIRED")
        }
        ProviderError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ProviderError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        ProviderError::ServerError { .. } | ProviderError::Timeout | ProviderError::Transport(_) => {
            (StatusCode::BAD_GATEWAY, "PROVIDER_UNAVAILABLE")
        }
        ProviderError::Unexpected { .. } | ProviderError::Decode(_) | ProviderError::Cancelled => {
            (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR")
        }
    };
    tracing::warn!(error = %err, "Provider call failed");
    (status, code, err.user_message().to_string())
}

fn classify_webhook(err: &WebhookError) -> Classified {
    match err {
        WebhookError::MissingHeader(_) | WebhookError::InvalidSignature => (
            StatusCode::UNAUTHORIZED,
            "INVALID_SIGNATURE",
            "Invalid webhook signature".to_string(),
        ),
        WebhookError::UnsupportedEvent(_) | WebhookError::InvalidPayload(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_WEBHOOK", err.to_string())
        }
        WebhookError::Lifecycle(inner) => classify_lifecycle(inner),
        WebhookError::Store(inner) => classify_store(inner),
        other => internal(other, "Webhook processing error"),
    }
}

fn classify_store(err: &StoreError) -> Classified {
    match err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        StoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        other => internal(other, "Store error"),
    }
}
