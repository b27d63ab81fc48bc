//! Route definitions for the `/users` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::users;
use crate::state::AppState;

/// Routes mounted at `/users`.
///
/// ```text
/// GET    /{id}/connections      -> list_connections
/// POST   /{id}/sync             -> sync_user
/// GET    /{id}/credit_score     -> latest_credit_score
/// POST   /{id}/credit_score     -> calculate_credit_score   (?months=6)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/connections", get(users::list_connections))
        .route("/{id}/sync", post(users::sync_user))
        .route(
            "/{id}/credit_score",
            get(users::latest_credit_score).post(users::calculate_credit_score),
        )
}
