//! In-memory store plus a provider that always approves and returns a
//! small fixed ledger.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use ledgerlink_core::signing::Credentials;
use ledgerlink_core::token_cipher::TokenCipher;
use ledgerlink_db::models::bank_connection::{BankConnection, CreateBankConnection};
use ledgerlink_db::models::user::CreateUser;
use ledgerlink_db::store::MemoryStore;
use ledgerlink_engine::{ConnectionLifecycle, EngineContext, PollOutcome};
use ledgerlink_events::EventBus;
use ledgerlink_openbanking::messages::{
    Account, AccountBalanceData, BillCategory, BillCustomer, Biller, DeviceAuthorization,
    PayBillRequest, PaymentReceipt, TokenResponse, TransactionPage, TransferEnquiry,
    TransferEnquiryRequest, TransferRequest, ValidateBillRequest,
};
use ledgerlink_openbanking::{DevicePollError, OpenBankingApi, ProviderError, Session};

pub const ACCOUNT: &str = "0123456789";

fn grant() -> TokenResponse {
    TokenResponse {
        access_token: "tok".into(),
        refresh_token: Some("rtok".into()),
        expires_in: 7200,
        scope: None,
        token_type: Some("Bearer".into()),
        refresh_expires_in: Some(90 * 86_400),
    }
}

fn not_offered() -> ProviderError {
    ProviderError::from_response(404, "", None)
}

#[derive(Default)]
pub struct SteadyProvider {
    /// Latency of the accounts call, to make overlapping syncs observable.
    pub accounts_delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub refreshes: AtomicUsize,
}

#[async_trait]
impl OpenBankingApi for SteadyProvider {
    async fn initiate_device_authorization(
        &self,
        _scopes: &[String],
        _account_number: Option<&str>,
    ) -> Result<DeviceAuthorization, ProviderError> {
        Ok(DeviceAuthorization {
            device_code: "D1".into(),
            user_code: "U1".into(),
            verification_uri: "https://x".into(),
            expires_in: 600,
            interval: 5,
        })
    }

    async fn poll_for_token(
        &self,
        _device_code: &str,
        _user_code: &str,
        _user_input: Option<&str>,
    ) -> Result<TokenResponse, DevicePollError> {
        Ok(grant())
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(grant())
    }

    async fn revoke_token(&self, _token: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn get_accounts(&self, _session: &Session) -> Result<Vec<Account>, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.accounts_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(vec![Account {
            account_number: ACCOUNT.into(),
            account_name: Some("Ada Obi".into()),
            account_type: None,
            currency: Some("NGN".into()),
        }])
    }

    async fn get_account_balance(
        &self,
        _session: &Session,
        _account_number: &str,
    ) -> Result<AccountBalanceData, ProviderError> {
        Ok(AccountBalanceData {
            available_balance: Some(500.0),
            ledger_balance: Some(500.0),
            current_balance: Some(500.0),
            currency: Some("NGN".into()),
        })
    }

    async fn get_account_transactions(
        &self,
        _session: &Session,
        _account_number: &str,
        _from: NaiveDate,
        _to: NaiveDate,
        page: u32,
    ) -> Result<TransactionPage, ProviderError> {
        let transactions: Vec<Value> = (1..=2)
            .map(|i| {
                json!({
                    "id": format!("T{i}"),
                    "amount": 1000.0 * i as f64,
                    "transaction_type": "credit",
                    "narration": "TRANSFER FROM OBI",
                    "transaction_time": "2026-09-01",
                })
            })
            .collect();
        Ok(TransactionPage {
            transactions,
            page,
            total_pages: 1,
        })
    }

    async fn get_bill_categories(
        &self,
        _session: &Session,
    ) -> Result<Vec<BillCategory>, ProviderError> {
        Err(not_offered())
    }

    async fn get_billers(
        &self,
        _session: &Session,
        _category_id: &str,
    ) -> Result<Vec<Biller>, ProviderError> {
        Err(not_offered())
    }

    async fn validate_bill(
        &self,
        _session: &Session,
        _request: &ValidateBillRequest,
    ) -> Result<BillCustomer, ProviderError> {
        Err(not_offered())
    }

    async fn pay_bill(
        &self,
        _session: &Session,
        _request: &PayBillRequest,
    ) -> Result<PaymentReceipt, ProviderError> {
        Err(not_offered())
    }

    async fn transfer_enquiry(
        &self,
        _session: &Session,
        _request: &TransferEnquiryRequest,
    ) -> Result<TransferEnquiry, ProviderError> {
        Err(not_offered())
    }

    async fn transfer(
        &self,
        _session: &Session,
        _request: &TransferRequest,
    ) -> Result<PaymentReceipt, ProviderError> {
        Err(not_offered())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<SteadyProvider>,
    pub ctx: EngineContext,
    pub lifecycle: ConnectionLifecycle,
    pub user_id: i64,
}

impl Harness {
    pub fn new(provider: SteadyProvider) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(provider);
        let ctx = EngineContext::new(
            store.clone(),
            provider.clone(),
            TokenCipher::from_bytes([3u8; 32]),
            Credentials::new("client-id", "client-secret"),
            Arc::new(EventBus::new(64)),
        );
        let user = store.insert_user(CreateUser {
            email: "ada@example.com".into(),
            full_name: "Ada Obi".into(),
            employment_status: None,
            date_of_birth: None,
        });
        Self {
            lifecycle: ConnectionLifecycle::new(ctx.clone()),
            store,
            provider,
            ctx,
            user_id: user.id,
        }
    }

    pub async fn pending(&self, account_number: &str) -> BankConnection {
        self.lifecycle
            .initiate(CreateBankConnection {
                user_id: self.user_id,
                bank_code: "058".into(),
                bank_name: "Test Bank".into(),
                account_number: account_number.into(),
                scopes: Vec::new(),
            })
            .await
            .unwrap()
            .connection
    }

    pub async fn active(&self, account_number: &str) -> BankConnection {
        let pending = self.pending(account_number).await;
        match self.lifecycle.poll(pending.id, None).await.unwrap() {
            PollOutcome::Active(connection) => connection,
            other => panic!("expected active connection, got {other:?}"),
        }
    }
}
