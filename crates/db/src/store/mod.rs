//! The persistence seam consumed by the engine.
//!
//! [`PgStore`](pg::PgStore) is the production implementation over the
//! repositories; [`MemoryStore`](memory::MemoryStore) keeps everything in
//! process for tests and local runs. Both enforce the same uniqueness
//! rules: one connection per (user, bank, account), one transaction per
//! (connection, external id), one webhook event per (type, event id).

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::NaiveDate;
use ledgerlink_core::scoring::Features;
use ledgerlink_core::status::{BillPaymentStatus, ConnectionStatus, WebhookEventStatus};
use ledgerlink_core::types::{DbId, Timestamp};

use crate::models::account_balance::{AccountBalance, NewAccountBalance};
use crate::models::bank_connection::{
    BankConnection, CreateBankConnection, DeviceAuthorizationUpdate, TokenUpdate,
};
use crate::models::bill_payment::{BillPayment, NewBillPayment};
use crate::models::credit_score::{CreditScore, NewCreditScore};
use crate::models::financial_profile::FinancialProfile;
use crate::models::transaction::{NewTransaction, Transaction};
use crate::models::user::User;
use crate::models::webhook_event::{NewWebhookEvent, WebhookEvent};

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    // -- Users -------------------------------------------------------------

    async fn find_user(&self, id: DbId) -> StoreResult<Option<User>>;

    // -- Bank connections --------------------------------------------------

    /// Create a pending connection. Duplicate (user, bank, account) is a
    /// [`StoreError::Conflict`].
    async fn create_connection(&self, input: &CreateBankConnection) -> StoreResult<BankConnection>;

    async fn find_connection(&self, id: DbId) -> StoreResult<Option<BankConnection>>;

    async fn find_connection_by_device_code(&self, device_code: &str) -> StoreResult<Option<BankConnection>>;

    async fn find_connection_by_consent_id(&self, consent_id: &str) -> StoreResult<Option<BankConnection>>;

    async fn list_user_connections(&self, user_id: DbId) -> StoreResult<Vec<BankConnection>>;

    async fn list_connections_by_status(&self, status: ConnectionStatus) -> StoreResult<Vec<BankConnection>>;

    /// Active connections whose token expires before `expires_before` and
    /// that synced at or after `synced_since`.
    async fn list_connections_needing_refresh(
        &self,
        expires_before: Timestamp,
        synced_since: Timestamp,
    ) -> StoreResult<Vec<BankConnection>>;

    /// Pending or active connections whose consent expired before `now`.
    async fn list_lapsed_consents(&self, now: Timestamp) -> StoreResult<Vec<BankConnection>>;

    async fn record_device_authorization(
        &self,
        id: DbId,
        update: &DeviceAuthorizationUpdate,
    ) -> StoreResult<()>;

    /// Store tokens, mark the connection active and clear device artifacts
    /// and any previous error.
    async fn activate_connection(&self, id: DbId, update: &TokenUpdate) -> StoreResult<BankConnection>;

    /// Set the status and error message. Returns `false` if no row matched.
    async fn set_connection_status(
        &self,
        id: DbId,
        status: ConnectionStatus,
        error_message: Option<&str>,
    ) -> StoreResult<bool>;

    async fn clear_connection_tokens(&self, id: DbId) -> StoreResult<()>;

    async fn mark_connection_synced(&self, id: DbId, synced_at: Timestamp) -> StoreResult<()>;

    async fn delete_connection(&self, id: DbId) -> StoreResult<bool>;

    /// Delete expired or revoked connections last updated before `before`.
    async fn delete_stale_connections(&self, before: Timestamp) -> StoreResult<u64>;

    async fn earliest_connection_created_at(&self, user_id: DbId) -> StoreResult<Option<Timestamp>>;

    // -- Balances ----------------------------------------------------------

    async fn latest_balance(
        &self,
        bank_connection_id: DbId,
        account_number: &str,
    ) -> StoreResult<Option<AccountBalance>>;

    async fn insert_balance(&self, input: &NewAccountBalance) -> StoreResult<AccountBalance>;

    /// Keep only the newest `keep` snapshots per connection.
    async fn prune_balances(&self, keep: i64) -> StoreResult<u64>;

    // -- Transactions ------------------------------------------------------

    /// Insert rows, silently skipping existing dedup keys. Returns the
    /// number actually inserted.
    async fn insert_transactions(&self, rows: &[NewTransaction]) -> StoreResult<u64>;

    /// All transactions of the user's connections dated on or after `since`.
    async fn list_user_transactions_since(
        &self,
        user_id: DbId,
        since: NaiveDate,
    ) -> StoreResult<Vec<Transaction>>;

    /// Update status and merge `metadata` into the transaction carrying
    /// `reference`. Returns `false` when none matched.
    async fn update_transaction_status_by_reference(
        &self,
        reference: &str,
        status: &str,
        metadata: &serde_json::Value,
    ) -> StoreResult<bool>;

    // -- Webhook events ----------------------------------------------------

    /// Insert a new event. Returns `None` when (type, event id) already
    /// exists.
    async fn insert_webhook_event(&self, input: &NewWebhookEvent) -> StoreResult<Option<WebhookEvent>>;

    async fn find_webhook_event(&self, id: DbId) -> StoreResult<Option<WebhookEvent>>;

    /// Move an event to `processing` and count the attempt, unless it is
    /// completed or another worker has been processing it since
    /// `stale_before` or later. Returns the claimed event.
    async fn claim_webhook_event(
        &self,
        id: DbId,
        stale_before: Timestamp,
    ) -> StoreResult<Option<WebhookEvent>>;

    /// Set a final status. `Completed` stamps `processed_at`.
    async fn finish_webhook_event(
        &self,
        id: DbId,
        status: WebhookEventStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()>;

    /// Failed events, plus pending or processing events not updated since
    /// `stale_before`, created after `created_after`.
    async fn list_retryable_webhook_events(
        &self,
        created_after: Timestamp,
        stale_before: Timestamp,
        max_attempts: i32,
        limit: i64,
    ) -> StoreResult<Vec<WebhookEvent>>;

    async fn delete_webhook_events_before(&self, before: Timestamp) -> StoreResult<u64>;

    // -- Bill payments -----------------------------------------------------

    async fn insert_bill_payment(&self, input: &NewBillPayment) -> StoreResult<BillPayment>;

    async fn update_bill_payment_status_by_reference(
        &self,
        external_reference: &str,
        status: BillPaymentStatus,
        status_message: Option<&str>,
    ) -> StoreResult<bool>;

    // -- Scores ------------------------------------------------------------

    async fn insert_credit_score(&self, input: &NewCreditScore) -> StoreResult<CreditScore>;

    async fn latest_credit_score(&self, user_id: DbId) -> StoreResult<Option<CreditScore>>;

    async fn upsert_financial_profile(
        &self,
        user_id: DbId,
        features: &Features,
    ) -> StoreResult<FinancialProfile>;
}

/// Whether a sqlx error is a unique-constraint violation (SQLSTATE 23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
