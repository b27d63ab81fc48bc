pub mod connections;
pub mod health;
pub mod users;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /connections                          initiate device authorization (POST)
/// /connections/{id}                     get, remove (DELETE)
/// /connections/{id}/poll                poll for token (POST)
/// /connections/{id}/reauthorize         restart the device flow (POST)
/// /connections/{id}/refresh             refresh token (POST)
/// /connections/{id}/revoke              revoke (POST)
/// /connections/{id}/sync                sync now (POST)
/// /connections/{id}/bill_payments       pay a bill (POST)
///
/// /users/{id}/connections               list a user's connections
/// /users/{id}/sync                      sync every active connection (POST)
/// /users/{id}/credit_score              latest (GET), compute now (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/connections", connections::router())
        .nest("/users", users::router())
}
