//! Route definitions for the `/connections` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::connections;
use crate::state::AppState;

/// Routes mounted at `/connections`.
///
/// ```text
/// POST   /                      -> initiate
/// GET    /{id}                  -> get_connection
/// DELETE /{id}                  -> remove
/// POST   /{id}/poll             -> poll   (?user_input=...)
/// POST   /{id}/reauthorize      -> reauthorize
/// POST   /{id}/refresh          -> refresh
/// POST   /{id}/revoke           -> revoke
/// POST   /{id}/sync             -> sync
/// POST   /{id}/bill_payments    -> pay_bill
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(connections::initiate))
        .route(
            "/{id}",
            get(connections::get_connection).delete(connections::remove),
        )
        .route("/{id}/poll", post(connections::poll))
        .route("/{id}/reauthorize", post(connections::reauthorize))
        .route("/{id}/refresh", post(connections::refresh))
        .route("/{id}/revoke", post(connections::revoke))
        .route("/{id}/sync", post(connections::sync))
        .route("/{id}/bill_payments", post(connections::pay_bill))
}
