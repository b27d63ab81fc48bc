//! PostgreSQL-backed [`Store`] delegating to the repositories.

use async_trait::async_trait;
use chrono::NaiveDate;
use ledgerlink_core::scoring::Features;
use ledgerlink_core::status::{BillPaymentStatus, ConnectionStatus, WebhookEventStatus};
use ledgerlink_core::types::{DbId, Timestamp};

use super::{is_unique_violation, Store, StoreError, StoreResult};
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
use crate::repositories::{
    AccountBalanceRepo, BankConnectionRepo, BillPaymentRepo, CreditScoreRepo,
    FinancialProfileRepo, TransactionRepo, UserRepo, WebhookEventRepo,
};
use crate::DbPool;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, id: DbId) -> StoreResult<Option<User>> {
        Ok(UserRepo::find_by_id(&self.pool, id).await?)
    }

    async fn create_connection(&self, input: &CreateBankConnection) -> StoreResult<BankConnection> {
        BankConnectionRepo::create(&self.pool, input)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!(
                        "A connection to bank {} for account {} already exists",
                        input.bank_code, input.account_number
                    ))
                } else {
                    StoreError::Database(e)
                }
            })
    }

    async fn find_connection(&self, id: DbId) -> StoreResult<Option<BankConnection>> {
        Ok(BankConnectionRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_connection_by_device_code(&self, device_code: &str) -> StoreResult<Option<BankConnection>> {
        Ok(BankConnectionRepo::find_by_device_code(&self.pool, device_code).await?)
    }

    async fn find_connection_by_consent_id(&self, consent_id: &str) -> StoreResult<Option<BankConnection>> {
        Ok(BankConnectionRepo::find_by_consent_id(&self.pool, consent_id).await?)
    }

    async fn list_user_connections(&self, user_id: DbId) -> StoreResult<Vec<BankConnection>> {
        Ok(BankConnectionRepo::list_by_user(&self.pool, user_id).await?)
    }

    async fn list_connections_by_status(&self, status: ConnectionStatus) -> StoreResult<Vec<BankConnection>> {
        Ok(BankConnectionRepo::list_by_status(&self.pool, status.id()).await?)
    }

    async fn list_connections_needing_refresh(
        &self,
        expires_before: Timestamp,
        synced_since: Timestamp,
    ) -> StoreResult<Vec<BankConnection>> {
        Ok(BankConnectionRepo::list_needing_refresh(&self.pool, expires_before, synced_since).await?)
    }

    async fn list_lapsed_consents(&self, now: Timestamp) -> StoreResult<Vec<BankConnection>> {
        Ok(BankConnectionRepo::list_lapsed_consents(&self.pool, now).await?)
    }

    async fn record_device_authorization(
        &self,
        id: DbId,
        update: &DeviceAuthorizationUpdate,
    ) -> StoreResult<()> {
        Ok(BankConnectionRepo::record_device_authorization(&self.pool, id, update).await?)
    }

    async fn activate_connection(&self, id: DbId, update: &TokenUpdate) -> StoreResult<BankConnection> {
        BankConnectionRepo::activate(&self.pool, id, update)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "BankConnection",
                id,
            })
    }

    async fn set_connection_status(
        &self,
        id: DbId,
        status: ConnectionStatus,
        error_message: Option<&str>,
    ) -> StoreResult<bool> {
        Ok(BankConnectionRepo::set_status(&self.pool, id, status.id(), error_message).await?)
    }

    async fn clear_connection_tokens(&self, id: DbId) -> StoreResult<()> {
        Ok(BankConnectionRepo::clear_tokens(&self.pool, id).await?)
    }

    async fn mark_connection_synced(&self, id: DbId, synced_at: Timestamp) -> StoreResult<()> {
        Ok(BankConnectionRepo::mark_synced(&self.pool, id, synced_at).await?)
    }

    async fn delete_connection(&self, id: DbId) -> StoreResult<bool> {
        Ok(BankConnectionRepo::delete(&self.pool, id).await?)
    }

    async fn delete_stale_connections(&self, before: Timestamp) -> StoreResult<u64> {
        Ok(BankConnectionRepo::delete_stale(&self.pool, before).await?)
    }

    async fn earliest_connection_created_at(&self, user_id: DbId) -> StoreResult<Option<Timestamp>> {
        Ok(BankConnectionRepo::earliest_created_at(&self.pool, user_id).await?)
    }

    async fn latest_balance(
        &self,
        bank_connection_id: DbId,
        account_number: &str,
    ) -> StoreResult<Option<AccountBalance>> {
        Ok(AccountBalanceRepo::latest(&self.pool, bank_connection_id, account_number).await?)
    }

    async fn insert_balance(&self, input: &NewAccountBalance) -> StoreResult<AccountBalance> {
        Ok(AccountBalanceRepo::insert(&self.pool, input).await?)
    }

    async fn prune_balances(&self, keep: i64) -> StoreResult<u64> {
        Ok(AccountBalanceRepo::prune(&self.pool, keep).await?)
    }

    async fn insert_transactions(&self, rows: &[NewTransaction]) -> StoreResult<u64> {
        Ok(TransactionRepo::insert_batch(&self.pool, rows).await?)
    }

    async fn list_user_transactions_since(
        &self,
        user_id: DbId,
        since: NaiveDate,
    ) -> StoreResult<Vec<Transaction>> {
        Ok(TransactionRepo::list_for_user_since(&self.pool, user_id, since).await?)
    }

    async fn update_transaction_status_by_reference(
        &self,
        reference: &str,
        status: &str,
        metadata: &serde_json::Value,
    ) -> StoreResult<bool> {
        Ok(TransactionRepo::update_status_by_reference(&self.pool, reference, status, metadata).await?)
    }

    async fn insert_webhook_event(&self, input: &NewWebhookEvent) -> StoreResult<Option<WebhookEvent>> {
        Ok(WebhookEventRepo::insert(&self.pool, input).await?)
    }

    async fn find_webhook_event(&self, id: DbId) -> StoreResult<Option<WebhookEvent>> {
        Ok(WebhookEventRepo::find_by_id(&self.pool, id).await?)
    }

    async fn claim_webhook_event(
        &self,
        id: DbId,
        stale_before: Timestamp,
    ) -> StoreResult<Option<WebhookEvent>> {
        Ok(WebhookEventRepo::claim(&self.pool, id, stale_before).await?)
    }

    async fn finish_webhook_event(
        &self,
        id: DbId,
        status: WebhookEventStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        Ok(WebhookEventRepo::finish(&self.pool, id, status.id(), error_message).await?)
    }

    async fn list_retryable_webhook_events(
        &self,
        created_after: Timestamp,
        stale_before: Timestamp,
        max_attempts: i32,
        limit: i64,
    ) -> StoreResult<Vec<WebhookEvent>> {
        Ok(
            WebhookEventRepo::list_retryable(&self.pool, created_after, stale_before, max_attempts, limit)
                .await?,
        )
    }

    async fn delete_webhook_events_before(&self, before: Timestamp) -> StoreResult<u64> {
        Ok(WebhookEventRepo::delete_before(&self.pool, before).await?)
    }

    async fn insert_bill_payment(&self, input: &NewBillPayment) -> StoreResult<BillPayment> {
        BillPaymentRepo::insert(&self.pool, input).await.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "Bill payment {} already recorded",
                    input.external_reference
                ))
            } else {
                StoreError::Database(e)
            }
        })
    }

    async fn update_bill_payment_status_by_reference(
        &self,
        external_reference: &str,
        status: BillPaymentStatus,
        status_message: Option<&str>,
    ) -> StoreResult<bool> {
        Ok(BillPaymentRepo::update_status_by_reference(
            &self.pool,
            external_reference,
            status,
            status_message,
        )
        .await?)
    }

    async fn insert_credit_score(&self, input: &NewCreditScore) -> StoreResult<CreditScore> {
        Ok(CreditScoreRepo::insert(&self.pool, input).await?)
    }

    async fn latest_credit_score(&self, user_id: DbId) -> StoreResult<Option<CreditScore>> {
        Ok(CreditScoreRepo::latest_for_user(&self.pool, user_id).await?)
    }

    async fn upsert_financial_profile(
        &self,
        user_id: DbId,
        features: &Features,
    ) -> StoreResult<FinancialProfile> {
        Ok(FinancialProfileRepo::upsert(&self.pool, user_id, features).await?)
    }
}
