//! Inbound provider callbacks.

use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/webhooks/open_banking`.
///
/// ```text
/// POST   /consent_status        -> consent_status
/// POST   /transfer_status       -> transfer_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/consent_status", post(webhooks::consent_status))
        .route("/transfer_status", post(webhooks::transfer_status))
}
