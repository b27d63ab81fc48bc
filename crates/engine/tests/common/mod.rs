//! Shared fixtures: an in-memory store and a scripted provider.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use ledgerlink_core::signing::Credentials;
use ledgerlink_core::token_cipher::TokenCipher;
use ledgerlink_db::models::bank_connection::{BankConnection, CreateBankConnection};
use ledgerlink_db::models::user::{CreateUser, User};
use ledgerlink_db::store::memory::MemoryStore;
use ledgerlink_engine::{ConnectionLifecycle, EngineContext, PollOutcome};
use ledgerlink_events::EventBus;
use ledgerlink_openbanking::messages::{
    Account, AccountBalanceData, BillCategory, BillCustomer, Biller, DeviceAuthorization,
    PayBillRequest, PaymentReceipt, TokenResponse, TransactionPage, TransferEnquiry,
    TransferEnquiryRequest, TransferRequest, ValidateBillRequest,
};
use ledgerlink_openbanking::{DevicePollError, OpenBankingApi, ProviderError, Session};

pub const CLIENT_SECRET: &str = "client-secret";
pub const PAGE_SIZE: usize = 2;

pub fn token(access: &str) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        refresh_token: Some(format!("r{access}")),
        expires_in: 7200,
        scope: Some("accounts.list.readonly".into()),
        token_type: Some("Bearer".into()),
        refresh_expires_in: Some(90 * 86_400),
    }
}

pub fn account(number: &str) -> Account {
    Account {
        account_number: number.to_string(),
        account_name: Some("Ada Obi".into()),
        account_type: Some("savings".into()),
        currency: Some("NGN".into()),
    }
}

pub fn txn(id: &str, amount: f64, kind: &str, date: &str, narration: &str) -> Value {
    json!({
        "id": id,
        "amount": amount,
        "transaction_type": kind,
        "narration": narration,
        "transaction_time": date,
        "reference": format!("REF-{id}"),
    })
}

/// Provider double whose responses are scripted per test.
pub struct FakeProvider {
    pub device: Mutex<DeviceAuthorization>,
    pub polls: Mutex<VecDeque<Result<TokenResponse, DevicePollError>>>,
    pub refreshes: Mutex<VecDeque<Result<TokenResponse, ProviderError>>>,
    pub accounts: Mutex<Vec<Account>>,
    pub account_errors: Mutex<VecDeque<ProviderError>>,
    pub balance: Mutex<AccountBalanceData>,
    pub transactions: Mutex<HashMap<String, Vec<Value>>>,
    pub transaction_errors: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    /// Fired when transactions of the named account are fetched.
    pub cancel_on_account: Mutex<Option<(String, CancellationToken)>>,
    pub payment_status: Mutex<String>,
    pub revoked: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            device: Mutex::new(DeviceAuthorization {
                device_code: "D1".into(),
                user_code: "U1".into(),
                verification_uri: "https://x".into(),
                expires_in: 600,
                interval: 5,
            }),
            polls: Mutex::default(),
            refreshes: Mutex::default(),
            accounts: Mutex::new(vec![account("0123456789")]),
            account_errors: Mutex::default(),
            balance: Mutex::new(AccountBalanceData {
                available_balance: Some(900.0),
                ledger_balance: Some(1000.0),
                current_balance: Some(1000.0),
                currency: Some("NGN".into()),
            }),
            transactions: Mutex::default(),
            transaction_errors: Mutex::default(),
            cancel_on_account: Mutex::default(),
            payment_status: Mutex::new("pending".into()),
            revoked: Mutex::default(),
            calls: Mutex::default(),
        }
    }
}

impl FakeProvider {
    pub fn set_transactions(&self, account_number: &str, records: Vec<Value>) {
        self.transactions
            .lock()
            .unwrap()
            .insert(account_number.to_string(), records);
    }

    pub fn fail_transactions(&self, account_number: &str, err: ProviderError) {
        self.transaction_errors
            .lock()
            .unwrap()
            .entry(account_number.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn calls_to(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl OpenBankingApi for FakeProvider {
    async fn initiate_device_authorization(
        &self,
        _scopes: &[String],
        _account_number: Option<&str>,
    ) -> Result<DeviceAuthorization, ProviderError> {
        self.record("device_code");
        Ok(self.device.lock().unwrap().clone())
    }

    async fn poll_for_token(
        &self,
        _device_code: &str,
        _user_code: &str,
        _user_input: Option<&str>,
    ) -> Result<TokenResponse, DevicePollError> {
        self.record("poll");
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(DevicePollError::AuthorizationPending))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        self.record("refresh");
        self.refreshes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(token("refreshed")))
    }

    async fn revoke_token(&self, token: &str) -> Result<(), ProviderError> {
        self.record("revoke");
        self.revoked.lock().unwrap().push(token.to_string());
        Ok(())
    }

    async fn get_accounts(&self, _session: &Session) -> Result<Vec<Account>, ProviderError> {
        self.record("accounts");
        if let Some(err) = self.account_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn get_account_balance(
        &self,
        _session: &Session,
        _account_number: &str,
    ) -> Result<AccountBalanceData, ProviderError> {
        self.record("balance");
        Ok(self.balance.lock().unwrap().clone())
    }

    async fn get_account_transactions(
        &self,
        _session: &Session,
        account_number: &str,
        _from: NaiveDate,
        _to: NaiveDate,
        page: u32,
    ) -> Result<TransactionPage, ProviderError> {
        self.record("transactions");
        if let Some((target, cancel)) = self.cancel_on_account.lock().unwrap().as_ref() {
            if target == account_number {
                cancel.cancel();
            }
        }
        if let Some(err) = self
            .transaction_errors
            .lock()
            .unwrap()
            .get_mut(account_number)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let records = self
            .transactions
            .lock()
            .unwrap()
            .get(account_number)
            .cloned()
            .unwrap_or_default();
        let total_pages = records.len().div_ceil(PAGE_SIZE).max(1) as u32;
        let transactions = records
            .chunks(PAGE_SIZE)
            .nth(page as usize - 1)
            .map(<[Value]>::to_vec)
            .unwrap_or_default();
        Ok(TransactionPage {
            transactions,
            page,
            total_pages,
        })
    }

    async fn get_bill_categories(
        &self,
        _session: &Session,
    ) -> Result<Vec<BillCategory>, ProviderError> {
        Ok(Vec::new())
    }

    async fn get_billers(
        &self,
        _session: &Session,
        _category_id: &str,
    ) -> Result<Vec<Biller>, ProviderError> {
        Ok(Vec::new())
    }

    async fn validate_bill(
        &self,
        _session: &Session,
        request: &ValidateBillRequest,
    ) -> Result<BillCustomer, ProviderError> {
        Ok(BillCustomer {
            bill_reference: request.bill_reference.clone(),
            customer_name: None,
            amount_due: None,
        })
    }

    async fn pay_bill(
        &self,
        _session: &Session,
        request: &PayBillRequest,
    ) -> Result<PaymentReceipt, ProviderError> {
        self.record("pay_bill");
        Ok(PaymentReceipt {
            reference: format!("PAY-{}", request.bill_reference),
            status: self.payment_status.lock().unwrap().clone(),
            message: Some("Payment received".into()),
        })
    }

    async fn transfer_enquiry(
        &self,
        _session: &Session,
        request: &TransferEnquiryRequest,
    ) -> Result<TransferEnquiry, ProviderError> {
        Ok(TransferEnquiry {
            account_name: "Ada Obi".into(),
            account_number: request.account_number.clone(),
            bank_code: Some(request.bank_code.clone()),
        })
    }

    async fn transfer(
        &self,
        _session: &Session,
        request: &TransferRequest,
    ) -> Result<PaymentReceipt, ProviderError> {
        Ok(PaymentReceipt {
            reference: request.reference.clone(),
            status: "pending".into(),
            message: None,
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<FakeProvider>,
    pub events: Arc<EventBus>,
    pub ctx: EngineContext,
    pub lifecycle: ConnectionLifecycle,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::default());
        let events = Arc::new(EventBus::new(64));
        let ctx = EngineContext::new(
            store.clone(),
            provider.clone(),
            TokenCipher::from_bytes([7u8; 32]),
            Credentials::new("client-id", CLIENT_SECRET),
            events.clone(),
        );
        let lifecycle = ConnectionLifecycle::new(ctx.clone());
        Self {
            store,
            provider,
            events,
            ctx,
            lifecycle,
        }
    }

    pub fn user(&self) -> User {
        self.store.insert_user(CreateUser {
            email: "ada@example.com".into(),
            full_name: "Ada Obi".into(),
            employment_status: Some("employed".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1994, 5, 17),
        })
    }

    pub fn new_connection(user_id: i64, account_number: &str) -> CreateBankConnection {
        CreateBankConnection {
            user_id,
            bank_code: "058".into(),
            bank_name: "Test Bank".into(),
            account_number: account_number.into(),
            scopes: vec!["accounts.list.readonly".into()],
        }
    }

    /// Run the device flow to completion for a fresh connection.
    pub async fn active_connection(&self, user_id: i64, account_number: &str) -> BankConnection {
        let started = self
            .lifecycle
            .initiate(Self::new_connection(user_id, account_number))
            .await
            .unwrap();
        self.provider
            .polls
            .lock()
            .unwrap()
            .push_back(Ok(token("tok")));
        match self.lifecycle.poll(started.connection.id, None).await.unwrap() {
            PollOutcome::Active(connection) => connection,
            other => panic!("expected active connection, got {other:?}"),
        }
    }
}
