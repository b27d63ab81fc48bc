//! In-memory [`Store`] for tests and local development.
//!
//! All tables live behind one mutex, so every operation is atomic with
//! respect to the others. The same uniqueness rules as the PostgreSQL
//! schema are enforced.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use ledgerlink_core::scoring::Features;
use ledgerlink_core::status::{BillPaymentStatus, ConnectionStatus, WebhookEventStatus};
use ledgerlink_core::types::{DbId, Timestamp};

use super::{Store, StoreError, StoreResult};
use crate::models::account_balance::{AccountBalance, NewAccountBalance};
use crate::models::bank_connection::{
    BankConnection, CreateBankConnection, DeviceAuthorizationUpdate, TokenUpdate,
};
use crate::models::bill_payment::{BillPayment, NewBillPayment};
use crate::models::credit_score::{CreditScore, NewCreditScore};
use crate::models::financial_profile::FinancialProfile;
use crate::models::transaction::{NewTransaction, Transaction};
use crate::models::user::{CreateUser, User};
use crate::models::webhook_event::{NewWebhookEvent, WebhookEvent};

#[derive(Default)]
struct Tables {
    next_id: DbId,
    users: HashMap<DbId, User>,
    connections: HashMap<DbId, BankConnection>,
    balances: Vec<AccountBalance>,
    transactions: Vec<Transaction>,
    webhook_events: Vec<WebhookEvent>,
    bill_payments: Vec<BillPayment>,
    credit_scores: Vec<CreditScore>,
    profiles: HashMap<DbId, FinancialProfile>,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Fixture helpers
    // -----------------------------------------------------------------------

    pub fn insert_user(&self, input: CreateUser) -> User {
        let mut t = self.tables();
        let now = Utc::now();
        let user = User {
            id: t.next_id(),
            email: input.email,
            full_name: input.full_name,
            employment_status: input.employment_status,
            date_of_birth: input.date_of_birth,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        user
    }

    /// Mutate a stored connection in place. Returns `false` if missing.
    pub fn update_connection(&self, id: DbId, f: impl FnOnce(&mut BankConnection)) -> bool {
        match self.tables().connections.get_mut(&id) {
            Some(conn) => {
                f(conn);
                true
            }
            None => false,
        }
    }

    /// Mutate a stored webhook event in place. Returns `false` if missing.
    pub fn update_webhook_event(&self, id: DbId, f: impl FnOnce(&mut WebhookEvent)) -> bool {
        match self.tables().webhook_events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                f(event);
                true
            }
            None => false,
        }
    }

    pub fn connection_transactions(&self, bank_connection_id: DbId) -> Vec<Transaction> {
        self.tables()
            .transactions
            .iter()
            .filter(|t| t.bank_connection_id == bank_connection_id)
            .cloned()
            .collect()
    }

    pub fn connection_balances(&self, bank_connection_id: DbId) -> Vec<AccountBalance> {
        self.tables()
            .balances
            .iter()
            .filter(|b| b.bank_connection_id == bank_connection_id)
            .cloned()
            .collect()
    }

    pub fn webhook_events(&self) -> Vec<WebhookEvent> {
        self.tables().webhook_events.clone()
    }

    pub fn bill_payments(&self) -> Vec<BillPayment> {
        self.tables().bill_payments.clone()
    }

    pub fn credit_scores(&self, user_id: DbId) -> Vec<CreditScore> {
        self.tables()
            .credit_scores
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn financial_profile(&self, user_id: DbId) -> Option<FinancialProfile> {
        self.tables().profiles.get(&user_id).cloned()
    }
}

/// Shallow JSON object merge, matching PostgreSQL `jsonb || jsonb`.
fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(t), Some(p)) => {
            for (k, v) in p {
                t.insert(k.clone(), v.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: DbId) -> StoreResult<Option<User>> {
        Ok(self.tables().users.get(&id).cloned())
    }

    // -- Bank connections --------------------------------------------------

    async fn create_connection(&self, input: &CreateBankConnection) -> StoreResult<BankConnection> {
        let mut t = self.tables();
        let duplicate = t.connections.values().any(|c| {
            c.user_id == input.user_id
                && c.bank_code == input.bank_code
                && c.account_number == input.account_number
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "A connection to bank {} for account {} already exists",
                input.bank_code, input.account_number
            )));
        }

        let now = Utc::now();
        let conn = BankConnection {
            id: t.next_id(),
            user_id: input.user_id,
            bank_code: input.bank_code.clone(),
            bank_name: input.bank_name.clone(),
            account_number: input.account_number.clone(),
            status_id: ConnectionStatus::Pending.id(),
            device_code: None,
            user_code: None,
            verification_uri: None,
            poll_interval_secs: None,
            encrypted_access_token: None,
            encrypted_refresh_token: None,
            token_expires_at: None,
            consent_id: None,
            consent_expires_at: None,
            scopes: input.scopes.clone(),
            last_synced_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        t.connections.insert(conn.id, conn.clone());
        Ok(conn)
    }

    async fn find_connection(&self, id: DbId) -> StoreResult<Option<BankConnection>> {
        Ok(self.tables().connections.get(&id).cloned())
    }

    async fn find_connection_by_device_code(&self, device_code: &str) -> StoreResult<Option<BankConnection>> {
        Ok(self
            .tables()
            .connections
            .values()
            .find(|c| c.device_code.as_deref() == Some(device_code))
            .cloned())
    }

    async fn find_connection_by_consent_id(&self, consent_id: &str) -> StoreResult<Option<BankConnection>> {
        Ok(self
            .tables()
            .connections
            .values()
            .filter(|c| c.consent_id.as_deref() == Some(consent_id))
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn list_user_connections(&self, user_id: DbId) -> StoreResult<Vec<BankConnection>> {
        let mut rows: Vec<_> = self
            .tables()
            .connections
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        Ok(rows)
    }

    async fn list_connections_by_status(&self, status: ConnectionStatus) -> StoreResult<Vec<BankConnection>> {
        let mut rows: Vec<_> = self
            .tables()
            .connections
            .values()
            .filter(|c| c.status_id == status.id())
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    async fn list_connections_needing_refresh(
        &self,
        expires_before: Timestamp,
        synced_since: Timestamp,
    ) -> StoreResult<Vec<BankConnection>> {
        let mut rows: Vec<_> = self
            .tables()
            .connections
            .values()
            .filter(|c| {
                c.status() == ConnectionStatus::Active
                    && c.encrypted_refresh_token.is_some()
                    && c.token_expires_at.map_or(true, |exp| exp < expires_before)
                    && c.last_synced_at.is_some_and(|s| s >= synced_since)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.token_expires_at, c.id));
        Ok(rows)
    }

    async fn list_lapsed_consents(&self, now: Timestamp) -> StoreResult<Vec<BankConnection>> {
        Ok(self
            .tables()
            .connections
            .values()
            .filter(|c| {
                matches!(c.status(), ConnectionStatus::Pending | ConnectionStatus::Active)
                    && c.consent_expires_at.is_some_and(|exp| exp < now)
            })
            .cloned()
            .collect())
    }

    async fn record_device_authorization(
        &self,
        id: DbId,
        update: &DeviceAuthorizationUpdate,
    ) -> StoreResult<()> {
        self.update_connection(id, |c| {
            c.device_code = Some(update.device_code.clone());
            c.user_code = Some(update.user_code.clone());
            c.verification_uri = Some(update.verification_uri.clone());
            c.poll_interval_secs = Some(update.poll_interval_secs);
            c.consent_expires_at = Some(update.consent_expires_at);
            c.status_id = ConnectionStatus::Pending.id();
            c.error_message = None;
            c.updated_at = Utc::now();
        });
        Ok(())
    }

    async fn activate_connection(&self, id: DbId, update: &TokenUpdate) -> StoreResult<BankConnection> {
        let mut t = self.tables();
        let conn = t.connections.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "BankConnection",
            id,
        })?;
        conn.encrypted_access_token = Some(update.encrypted_access_token.clone());
        if let Some(refresh) = &update.encrypted_refresh_token {
            conn.encrypted_refresh_token = Some(refresh.clone());
        }
        conn.token_expires_at = Some(update.token_expires_at);
        if let Some(consent_id) = &update.consent_id {
            conn.consent_id = Some(consent_id.clone());
        }
        conn.consent_expires_at = update.consent_expires_at;
        if let Some(scopes) = &update.scopes {
            conn.scopes = scopes.clone();
        }
        conn.status_id = ConnectionStatus::Active.id();
        conn.device_code = None;
        conn.user_code = None;
        conn.verification_uri = None;
        conn.error_message = None;
        conn.updated_at = Utc::now();
        Ok(conn.clone())
    }

    async fn set_connection_status(
        &self,
        id: DbId,
        status: ConnectionStatus,
        error_message: Option<&str>,
    ) -> StoreResult<bool> {
        Ok(self.update_connection(id, |c| {
            c.status_id = status.id();
            c.error_message = error_message.map(str::to_string);
            c.updated_at = Utc::now();
        }))
    }

    async fn clear_connection_tokens(&self, id: DbId) -> StoreResult<()> {
        self.update_connection(id, |c| {
            c.encrypted_access_token = None;
            c.encrypted_refresh_token = None;
            c.token_expires_at = None;
            c.updated_at = Utc::now();
        });
        Ok(())
    }

    async fn mark_connection_synced(&self, id: DbId, synced_at: Timestamp) -> StoreResult<()> {
        self.update_connection(id, |c| {
            c.last_synced_at = Some(synced_at);
            c.updated_at = Utc::now();
        });
        Ok(())
    }

    async fn delete_connection(&self, id: DbId) -> StoreResult<bool> {
        let mut t = self.tables();
        let removed = t.connections.remove(&id).is_some();
        if removed {
            t.balances.retain(|b| b.bank_connection_id != id);
            t.transactions.retain(|tx| tx.bank_connection_id != id);
            for payment in t.bill_payments.iter_mut() {
                if payment.bank_connection_id == Some(id) {
                    payment.bank_connection_id = None;
                }
            }
        }
        Ok(removed)
    }

    async fn delete_stale_connections(&self, before: Timestamp) -> StoreResult<u64> {
        let stale: Vec<DbId> = self
            .tables()
            .connections
            .values()
            .filter(|c| {
                matches!(c.status(), ConnectionStatus::Expired | ConnectionStatus::Revoked)
                    && c.updated_at < before
            })
            .map(|c| c.id)
            .collect();
        let mut deleted = 0;
        for id in stale {
            if self.delete_connection(id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn earliest_connection_created_at(&self, user_id: DbId) -> StoreResult<Option<Timestamp>> {
        Ok(self
            .tables()
            .connections
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.created_at)
            .min())
    }

    // -- Balances ----------------------------------------------------------

    async fn latest_balance(
        &self,
        bank_connection_id: DbId,
        account_number: &str,
    ) -> StoreResult<Option<AccountBalance>> {
        Ok(self
            .tables()
            .balances
            .iter()
            .filter(|b| b.bank_connection_id == bank_connection_id && b.account_number == account_number)
            .max_by_key(|b| (b.balance_date, b.id))
            .cloned())
    }

    async fn insert_balance(&self, input: &NewAccountBalance) -> StoreResult<AccountBalance> {
        let mut t = self.tables();
        let row = AccountBalance {
            id: t.next_id(),
            bank_connection_id: input.bank_connection_id,
            account_number: input.account_number.clone(),
            current_balance: input.current_balance,
            available_balance: input.available_balance,
            ledger_balance: input.ledger_balance,
            currency: input.currency.clone(),
            balance_date: input.balance_date,
            metadata: input.metadata.clone(),
            created_at: Utc::now(),
        };
        t.balances.push(row.clone());
        Ok(row)
    }

    async fn prune_balances(&self, keep: i64) -> StoreResult<u64> {
        let keep = usize::try_from(keep.max(0)).unwrap_or(usize::MAX);
        let mut t = self.tables();

        let mut by_connection: HashMap<DbId, Vec<(Timestamp, DbId)>> = HashMap::new();
        for b in &t.balances {
            by_connection
                .entry(b.bank_connection_id)
                .or_default()
                .push((b.balance_date, b.id));
        }
        let mut doomed: HashSet<DbId> = HashSet::new();
        for rows in by_connection.values_mut() {
            rows.sort_by(|a, b| b.cmp(a));
            doomed.extend(rows.iter().skip(keep).map(|(_, id)| *id));
        }

        let before = t.balances.len();
        t.balances.retain(|b| !doomed.contains(&b.id));
        Ok((before - t.balances.len()) as u64)
    }

    // -- Transactions ------------------------------------------------------

    async fn insert_transactions(&self, rows: &[NewTransaction]) -> StoreResult<u64> {
        let mut t = self.tables();
        let mut seen: HashSet<(DbId, String)> = t
            .transactions
            .iter()
            .map(|tx| (tx.bank_connection_id, tx.external_transaction_id.clone()))
            .collect();

        let now = Utc::now();
        let mut inserted = 0;
        for row in rows {
            if !seen.insert((row.bank_connection_id, row.external_transaction_id.clone())) {
                continue;
            }
            let id = t.next_id();
            t.transactions.push(Transaction {
                id,
                bank_connection_id: row.bank_connection_id,
                account_number: row.account_number.clone(),
                external_transaction_id: row.external_transaction_id.clone(),
                amount: row.amount,
                direction: row.direction.clone(),
                category: row.category.clone(),
                description: row.description.clone(),
                reference: row.reference.clone(),
                status: None,
                transaction_date: row.transaction_date,
                balance_after: row.balance_after,
                metadata: row.metadata.clone(),
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_user_transactions_since(
        &self,
        user_id: DbId,
        since: NaiveDate,
    ) -> StoreResult<Vec<Transaction>> {
        let t = self.tables();
        let connection_ids: HashSet<DbId> = t
            .connections
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.id)
            .collect();
        let mut rows: Vec<_> = t
            .transactions
            .iter()
            .filter(|tx| connection_ids.contains(&tx.bank_connection_id) && tx.transaction_date >= since)
            .cloned()
            .collect();
        rows.sort_by_key(|tx| (tx.transaction_date, tx.id));
        Ok(rows)
    }

    async fn update_transaction_status_by_reference(
        &self,
        reference: &str,
        status: &str,
        metadata: &serde_json::Value,
    ) -> StoreResult<bool> {
        let mut t = self.tables();
        let mut matched = false;
        for tx in t
            .transactions
            .iter_mut()
            .filter(|tx| tx.reference.as_deref() == Some(reference))
        {
            tx.status = Some(status.to_string());
            merge_json(&mut tx.metadata, metadata);
            tx.updated_at = Utc::now();
            matched = true;
        }
        Ok(matched)
    }

    // -- Webhook events ----------------------------------------------------

    async fn insert_webhook_event(&self, input: &NewWebhookEvent) -> StoreResult<Option<WebhookEvent>> {
        let mut t = self.tables();
        if t
            .webhook_events
            .iter()
            .any(|e| e.event_type == input.event_type && e.event_id == input.event_id)
        {
            return Ok(None);
        }
        let now = Utc::now();
        let event = WebhookEvent {
            id: t.next_id(),
            event_type: input.event_type.clone(),
            event_id: input.event_id.clone(),
            payload: input.payload.clone(),
            status_id: WebhookEventStatus::Pending.id(),
            error_message: None,
            attempts: 0,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        t.webhook_events.push(event.clone());
        Ok(Some(event))
    }

    async fn find_webhook_event(&self, id: DbId) -> StoreResult<Option<WebhookEvent>> {
        Ok(self.tables().webhook_events.iter().find(|e| e.id == id).cloned())
    }

    async fn claim_webhook_event(
        &self,
        id: DbId,
        stale_before: Timestamp,
    ) -> StoreResult<Option<WebhookEvent>> {
        let mut t = self.tables();
        let Some(event) = t.webhook_events.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        let claimable = match event.status() {
            WebhookEventStatus::Pending | WebhookEventStatus::Failed => true,
            WebhookEventStatus::Processing => event.updated_at < stale_before,
            WebhookEventStatus::Completed => false,
        };
        if !claimable {
            return Ok(None);
        }
        event.status_id = WebhookEventStatus::Processing.id();
        event.attempts += 1;
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    async fn finish_webhook_event(
        &self,
        id: DbId,
        status: WebhookEventStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        self.update_webhook_event(id, |e| {
            let now = Utc::now();
            e.status_id = status.id();
            e.error_message = error_message.map(str::to_string);
            if status == WebhookEventStatus::Completed {
                e.processed_at = Some(now);
            }
            e.updated_at = now;
        });
        Ok(())
    }

    async fn list_retryable_webhook_events(
        &self,
        created_after: Timestamp,
        stale_before: Timestamp,
        max_attempts: i32,
        limit: i64,
    ) -> StoreResult<Vec<WebhookEvent>> {
        let mut rows: Vec<_> = self
            .tables()
            .webhook_events
            .iter()
            .filter(|e| {
                let due = match e.status() {
                    WebhookEventStatus::Failed => true,
                    WebhookEventStatus::Pending | WebhookEventStatus::Processing => {
                        e.updated_at < stale_before
                    }
                    WebhookEventStatus::Completed => false,
                };
                due && e.created_at > created_after && e.attempts < max_attempts
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.created_at, e.id));
        rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn delete_webhook_events_before(&self, before: Timestamp) -> StoreResult<u64> {
        let mut t = self.tables();
        let len = t.webhook_events.len();
        t.webhook_events.retain(|e| e.created_at >= before);
        Ok((len - t.webhook_events.len()) as u64)
    }

    // -- Bill payments -----------------------------------------------------

    async fn insert_bill_payment(&self, input: &NewBillPayment) -> StoreResult<BillPayment> {
        let mut t = self.tables();
        if t
            .bill_payments
            .iter()
            .any(|p| p.external_reference == input.external_reference)
        {
            return Err(StoreError::Conflict(format!(
                "Bill payment {} already recorded",
                input.external_reference
            )));
        }
        let now = Utc::now();
        let row = BillPayment {
            id: t.next_id(),
            user_id: input.user_id,
            bank_connection_id: input.bank_connection_id,
            biller_id: input.biller_id.clone(),
            customer_reference: input.customer_reference.clone(),
            amount: input.amount,
            external_reference: input.external_reference.clone(),
            status_id: input.status.id(),
            status_message: input.status_message.clone(),
            metadata: input.metadata.clone(),
            completed_at: input.status.is_terminal().then_some(now),
            created_at: now,
            updated_at: now,
        };
        t.bill_payments.push(row.clone());
        Ok(row)
    }

    async fn update_bill_payment_status_by_reference(
        &self,
        external_reference: &str,
        status: BillPaymentStatus,
        status_message: Option<&str>,
    ) -> StoreResult<bool> {
        let mut t = self.tables();
        let Some(payment) = t
            .bill_payments
            .iter_mut()
            .find(|p| p.external_reference == external_reference)
        else {
            return Ok(false);
        };
        let now = Utc::now();
        payment.status_id = status.id();
        if let Some(message) = status_message {
            payment.status_message = Some(message.to_string());
        }
        if status.is_terminal() && payment.completed_at.is_none() {
            payment.completed_at = Some(now);
        }
        payment.updated_at = now;
        Ok(true)
    }

    // -- Scores ------------------------------------------------------------

    async fn insert_credit_score(&self, input: &NewCreditScore) -> StoreResult<CreditScore> {
        let mut t = self.tables();
        let row = CreditScore {
            id: t.next_id(),
            user_id: input.user_id,
            score: input.score,
            grade: input.grade.clone(),
            risk_level: input.risk_level.clone(),
            default_probability: input.default_probability,
            breakdown: input.breakdown.clone(),
            features: input.features.clone(),
            risk_factors: input.risk_factors.clone(),
            improvement_suggestions: input.improvement_suggestions.clone(),
            model_version: input.model_version.clone(),
            calculated_at: Utc::now(),
        };
        t.credit_scores.push(row.clone());
        Ok(row)
    }

    async fn latest_credit_score(&self, user_id: DbId) -> StoreResult<Option<CreditScore>> {
        Ok(self
            .tables()
            .credit_scores
            .iter()
            .filter(|s| s.user_id == user_id)
            .max_by_key(|s| (s.calculated_at, s.id))
            .cloned())
    }

    async fn upsert_financial_profile(
        &self,
        user_id: DbId,
        features: &Features,
    ) -> StoreResult<FinancialProfile> {
        let mut t = self.tables();
        let now = Utc::now();
        let id = match t.profiles.get(&user_id) {
            Some(existing) => existing.id,
            None => t.next_id(),
        };
        let profile = t.profiles.entry(user_id).or_insert_with(|| FinancialProfile {
            id,
            user_id,
            avg_monthly_income: 0.0,
            avg_monthly_expenses: 0.0,
            savings_rate: 0.0,
            debt_to_income: 0.0,
            income_stability: 0.0,
            spending_volatility: 0.0,
            transaction_count: 0,
            created_at: now,
            updated_at: now,
        });
        profile.apply(features, now);
        Ok(profile.clone())
    }
}
