//! Test app wired to an in-memory store and an in-process fake bank.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Days, NaiveDate, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ledgerlink_api::config::ServerConfig;
use ledgerlink_api::router::build_app_router;
use ledgerlink_api::state::AppState;
use ledgerlink_core::signing::Credentials;
use ledgerlink_core::token_cipher::TokenCipher;
use ledgerlink_db::models::user::{CreateUser, User};
use ledgerlink_db::store::MemoryStore;
use ledgerlink_engine::EngineContext;
use ledgerlink_events::EventBus;
use ledgerlink_openbanking::{
    OpenBankingClient, OpenBankingConfig, RetryConfig, RetryPolicy,
};

pub const CLIENT_SECRET: &str = "bank-secret";
pub const ACCOUNT: &str = "0123456789";

// ---------------------------------------------------------------------------
// Fake bank
// ---------------------------------------------------------------------------

/// Provider double served over HTTP so requests go through the real client.
#[derive(Default)]
pub struct FakeBank {
    pub approved: AtomicBool,
    /// When non-zero, `/accounts` answers with this status.
    pub accounts_status: AtomicU16,
    pub revocations: AtomicU32,
    pub transactions: Mutex<Vec<Value>>,
}

type Shared = Arc<FakeBank>;

async fn device_code() -> Json<Value> {
    Json(json!({
        "device_code": "D1",
        "user_code": "U1",
        "verification_uri": "https://bank.example/device",
        "expires_in": 600,
        "interval": 5
    }))
}

async fn token(State(bank): State<Shared>, Json(body): Json<Value>) -> Response {
    let grant = json!({
        "access_token": "tok",
        "refresh_token": "rtok",
        "expires_in": 7200,
        "refresh_expires_in": 7_776_000,
        "scope": "accounts.list.readonly accounts.transactions.readonly"
    });
    match body["grant_type"].as_str() {
        Some("refresh_token") => Json(grant).into_response(),
        Some(_) if bank.approved.load(Ordering::SeqCst) => Json(grant).into_response(),
        Some(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "authorization_pending" })),
        )
            .into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn revoke(State(bank): State<Shared>) -> StatusCode {
    bank.revocations.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn accounts(State(bank): State<Shared>) -> Response {
    let status = bank.accounts_status.load(Ordering::SeqCst);
    if status != 0 {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (
            status,
            Json(json!({ "status": "error", "message": "internal ledger failure at node 7" })),
        )
            .into_response();
    }
    Json(json!({
        "status": "success",
        "message": "Accounts retrieved",
        "data": [{ "account_number": ACCOUNT, "account_name": "Ada Obi", "currency": "NGN" }]
    }))
    .into_response()
}

async fn balance(Path(_account): Path<String>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": { "available_balance": 90_000, "ledger_balance": 100_000, "current_balance": 100_000 }
    }))
}

async fn transactions(
    State(bank): State<Shared>,
    Path(_account): Path<String>,
    Query(_params): Query<std::collections::HashMap<String, String>>,
) -> Json<Value> {
    let records = bank.transactions.lock().unwrap().clone();
    Json(json!({
        "status": "success",
        "data": { "transactions": records, "page": 1, "total_pages": 1 }
    }))
}

async fn spawn_bank() -> (OpenBankingClient, Shared) {
    let bank = Shared::default();
    let app = Router::new()
        .route("/oauth2/device/code", post(device_code))
        .route("/oauth2/token", post(token))
        .route("/oauth2/revoke", post(revoke))
        .route("/accounts", get(accounts))
        .route("/accounts/{account}/balance", get(balance))
        .route("/accounts/{account}/transactions", get(transactions))
        .with_state(bank.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = OpenBankingConfig::new(
        format!("http://{addr}"),
        Credentials::new("client-1", CLIENT_SECRET),
    )
    .with_timeout(Duration::from_secs(5))
    .with_min_request_interval(Duration::ZERO);
    (OpenBankingClient::new(config).unwrap(), bank)
}

/// A ledger of `count` transactions over the last few months.
pub fn ledger(count: usize) -> Vec<Value> {
    let today = Utc::now().date_naive();
    (0..count)
        .map(|i| {
            let date = (today - Days::new(3 + i as u64 * 6)).to_string();
            let (amount, kind, narration) = if i % 4 == 0 {
                (300_000.0, "credit", "SALARY PAYMENT")
            } else {
                (20_000.0, "debit", "POS PURCHASE SHOPRITE")
            };
            json!({
                "id": format!("T{i}"),
                "amount": amount,
                "transaction_type": kind,
                "narration": narration,
                "transaction_time": date,
                "reference": format!("REF-T{i}"),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Test app
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub bank: Shared,
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let (client, bank) = spawn_bank().await;
        let store = Arc::new(MemoryStore::new());
        let ctx = EngineContext::new(
            store.clone(),
            Arc::new(client),
            TokenCipher::from_bytes([9u8; 32]),
            Credentials::new("client-1", CLIENT_SECRET),
            Arc::new(EventBus::new(64)),
        )
        // No backoff sleeps in tests: provider failures surface immediately.
        .with_retry(RetryPolicy::new(RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        }));
        let state = AppState::new(test_config(), ctx, CancellationToken::new());
        Self {
            app: build_app_router(state.clone()),
            state,
            store,
            bank,
        }
    }

    pub fn user(&self) -> User {
        self.store.insert_user(CreateUser {
            email: "ada@example.com".into(),
            full_name: "Ada Obi".into(),
            employment_status: Some("employed".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 2, 11),
        })
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str) -> Response {
        self.send(Request::post(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> Response {
        self.send(Request::delete(uri).body(Body::empty()).unwrap()).await
    }

    /// Start a device flow for the user and return the connection id.
    pub async fn pending_connection(&self, user_id: i64) -> i64 {
        let response = self
            .post_json(
                "/api/v1/connections",
                json!({
                    "user_id": user_id,
                    "bank_code": "058",
                    "bank_name": "Test Bank",
                    "account_number": ACCOUNT,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["data"]["connection"]["id"]
            .as_i64()
            .unwrap()
    }

    /// Run the device flow through approval.
    pub async fn active_connection(&self, user_id: i64) -> i64 {
        let id = self.pending_connection(user_id).await;
        self.bank.approved.store(true, Ordering::SeqCst);
        let response = self.post(&format!("/api/v1/connections/{id}/poll")).await;
        assert_eq!(response.status(), StatusCode::OK);
        id
    }

    /// Wait for background webhook processing to finish.
    pub async fn drain_tasks(&self) {
        self.state.tasks.close();
        self.state.tasks.wait().await;
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
