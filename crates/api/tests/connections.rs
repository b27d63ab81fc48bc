mod common;

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use serde_json::json;

use ledgerlink_core::status::ConnectionStatus;

use common::{body_json, ledger, TestApp, ACCOUNT};

#[tokio::test]
async fn initiate_returns_the_user_code() {
    let app = TestApp::spawn().await;
    let user = app.user();

    let response = app
        .post_json(
            "/api/v1/connections",
            json!({
                "user_id": user.id,
                "bank_code": "058",
                "bank_name": "Test Bank",
                "account_number": ACCOUNT,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["user_code"], "U1");
    assert_eq!(body["data"]["verification_uri"], "https://bank.example/device");
    assert_eq!(body["data"]["interval"], 5);
    // Device codes and tokens never leave the server.
    assert!(body["data"]["connection"].get("device_code").is_none());
    assert!(body["data"]["connection"].get("encrypted_access_token").is_none());
}

#[tokio::test]
async fn empty_account_number_is_rejected() {
    let app = TestApp::spawn().await;
    let user = app.user();
    let response = app
        .post_json(
            "/api/v1/connections",
            json!({ "user_id": user.id, "bank_code": "058", "bank_name": "Test Bank", "account_number": " " }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn duplicate_connection_conflicts() {
    let app = TestApp::spawn().await;
    let user = app.user();
    app.pending_connection(user.id).await;

    let response = app
        .post_json(
            "/api/v1/connections",
            json!({ "user_id": user.id, "bank_code": "058", "bank_name": "Test Bank", "account_number": ACCOUNT }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "DUPLICATE_CONNECTION");
}

#[tokio::test]
async fn poll_is_pending_until_approved() {
    let app = TestApp::spawn().await;
    let user = app.user();
    let id = app.pending_connection(user.id).await;

    let response = app.post(&format!("/api/v1/connections/{id}/poll")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["retry_after_secs"], 5);

    app.bank.approved.store(true, Ordering::SeqCst);
    let response = app.post(&format!("/api/v1/connections/{id}/poll")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["connection"]["id"], id);
}

#[tokio::test]
async fn unknown_connection_is_404() {
    let app = TestApp::spawn().await;
    let response = app.post("/api/v1/connections/999/poll").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn sync_imports_transactions_once() {
    let app = TestApp::spawn().await;
    let user = app.user();
    let id = app.active_connection(user.id).await;
    *app.bank.transactions.lock().unwrap() = ledger(4);

    let response = app.post(&format!("/api/v1/connections/{id}/sync")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["accounts_synced"], 1);
    assert_eq!(body["data"]["transactions_inserted"], 4);
    assert_eq!(body["data"]["balances_recorded"], 1);

    let again = body_json(app.post(&format!("/api/v1/connections/{id}/sync")).await).await;
    assert_eq!(again["data"]["transactions_inserted"], 0);
    assert_eq!(app.store.connection_transactions(id).len(), 4);
}

#[tokio::test]
async fn pending_connection_cannot_sync() {
    let app = TestApp::spawn().await;
    let user = app.user();
    let id = app.pending_connection(user.id).await;

    let response = app.post(&format!("/api/v1/connections/{id}/sync")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONNECTION_NOT_ACTIVE");
}

#[tokio::test]
async fn provider_outage_is_reported_without_details() {
    let app = TestApp::spawn().await;
    let user = app.user();
    let id = app.active_connection(user.id).await;
    app.bank.accounts_status.store(503, Ordering::SeqCst);

    let response = app.post(&format!("/api/v1/connections/{id}/sync")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "PROVIDER_UNAVAILABLE");
    assert!(!body["error"].as_str().unwrap().contains("node 7"));

    // A transient outage leaves the connection usable.
    let stored = app.state.lifecycle.load(id).await.unwrap();
    assert_eq!(stored.status(), ConnectionStatus::Active);
}

#[tokio::test]
async fn forbidden_sync_revokes_the_connection() {
    let app = TestApp::spawn().await;
    let user = app.user();
    let id = app.active_connection(user.id).await;
    app.bank.accounts_status.store(403, Ordering::SeqCst);

    let response = app.post(&format!("/api/v1/connections/{id}/sync")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "RECONNECT_REQUIRED");
    let stored = app.state.lifecycle.load(id).await.unwrap();
    assert_eq!(stored.status(), ConnectionStatus::Revoked);
}

#[tokio::test]
async fn refresh_rotates_tokens() {
    let app = TestApp::spawn().await;
    let user = app.user();
    let id = app.active_connection(user.id).await;
    let before = app.state.lifecycle.load(id).await.unwrap();

    let response = app.post(&format!("/api/v1/connections/{id}/refresh")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let after = app.state.lifecycle.load(id).await.unwrap();
    assert_ne!(after.encrypted_access_token, before.encrypted_access_token);
}

#[tokio::test]
async fn revoke_then_delete() {
    let app = TestApp::spawn().await;
    let user = app.user();
    let id = app.active_connection(user.id).await;

    let response = app.post(&format!("/api/v1/connections/{id}/revoke")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.bank.revocations.load(Ordering::SeqCst), 1);

    let response = app.post(&format!("/api/v1/connections/{id}/reauthorize")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["user_code"], "U1");

    let response = app.delete(&format!("/api/v1/connections/{id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        app.get(&format!("/api/v1/connections/{id}")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn user_connections_are_listed() {
    let app = TestApp::spawn().await;
    let user = app.user();
    let id = app.pending_connection(user.id).await;

    let response = app.get(&format!("/api/v1/users/{}/connections", user.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"][0]["id"], id);
}
