//! Import of accounts, balances and transactions for active connections.
//!
//! One sync holds the connection's lock for its whole run, so a scheduled
//! refresh never rotates tokens underneath it. Accounts are processed one
//! at a time; a failing account is recorded in the [`SyncReport`] and the
//! loop moves on, except for 401/403, which end the run because every
//! further call would fail the same way.
//!
//! `last_synced_at` advances to the time the run *started*, and only when
//! every account succeeded and the run was not cancelled or aborted. The
//! checkpoint is per connection, so one failed account holds it back for
//! all of them and the next window still covers the failed account's gap.
//! Overlap is harmless: rows are deduplicated on (connection, external id).

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use ledgerlink_core::normalize::normalize_transaction;
use ledgerlink_core::status::ConnectionStatus;
use ledgerlink_core::types::{to_minor_units, DbId, Timestamp};
use ledgerlink_db::models::account_balance::NewAccountBalance;
use ledgerlink_db::models::bank_connection::BankConnection;
use ledgerlink_db::models::transaction::NewTransaction;
use ledgerlink_db::store::StoreError;
use ledgerlink_events::DomainEvent;
use ledgerlink_openbanking::client::collect_pages;
use ledgerlink_openbanking::messages::{Account, AccountBalanceData, ProviderTransaction};
use ledgerlink_openbanking::{ProviderError, Session};

use crate::lifecycle::{ConnectionLifecycle, LifecycleError};

/// Window used when a connection has never synced.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 90;

/// Rows per insert statement.
pub const INSERT_BATCH_SIZE: usize = 100;

/// An unchanged balance is snapshotted again once the latest snapshot is
/// this old.
pub const BALANCE_SNAPSHOT_MAX_AGE_HOURS: i64 = 6;

const DEFAULT_CURRENCY: &str = "NGN";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Connection {id} is {status}; only active connections sync")]
    NotActive { id: DbId, status: ConnectionStatus },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
enum AccountError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountFailure {
    pub account_number: String,
    pub reason: String,
}

/// Outcome of one connection sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub connection_id: DbId,
    pub accounts_total: usize,
    pub accounts_synced: usize,
    pub accounts_failed: Vec<AccountFailure>,
    pub transactions_inserted: u64,
    /// Records dropped as malformed.
    pub transactions_skipped: u64,
    pub balances_recorded: usize,
    pub cancelled: bool,
    /// A 401/403 ended the run early.
    pub aborted: bool,
}

/// Result of syncing every active connection of one user.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserSyncSummary {
    pub reports: Vec<SyncReport>,
    pub failures: Vec<AccountFailure>,
    pub transactions_inserted: u64,
}

#[derive(Clone)]
pub struct SyncEngine {
    lifecycle: ConnectionLifecycle,
}

impl SyncEngine {
    pub fn new(lifecycle: ConnectionLifecycle) -> Self {
        Self { lifecycle }
    }

    /// Sync one connection. Safe to re-run: identical provider data inserts
    /// nothing the second time.
    pub async fn sync_connection(
        &self,
        connection_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let ctx = self.lifecycle.context();
        let _guard = ctx.locks.acquire(connection_id).await;
        let started_at = Utc::now();

        let connection = self.lifecycle.load(connection_id).await?;
        let status = connection.status();
        if status != ConnectionStatus::Active {
            return Err(SyncError::NotActive {
                id: connection_id,
                status,
            });
        }

        let connection = self.lifecycle.ensure_fresh(&connection).await?;
        let session = self.lifecycle.session(&connection)?;

        let to = started_at.date_naive();
        let from = connection
            .last_synced_at
            .map(|t| t.date_naive())
            .unwrap_or_else(|| to - Days::new(DEFAULT_LOOKBACK_DAYS));

        let mut report = SyncReport {
            connection_id,
            ..Default::default()
        };

        let provider = &ctx.provider;
        let accounts = match ctx
            .retry
            .run_with_cancel(&format!("sync:{connection_id}:accounts"), cancel, || {
                provider.get_accounts(&session)
            })
            .await
        {
            Ok(accounts) => accounts,
            Err(ProviderError::Cancelled) => {
                report.cancelled = true;
                return Ok(report);
            }
            Err(e) => {
                tracing::error!(connection_id, error = %e, "Failed to list accounts");
                self.lifecycle.record_provider_failure(&connection, &e).await;
                return Err(e.into());
            }
        };
        report.accounts_total = accounts.len();

        for account in &accounts {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self
                .sync_account(&connection, &session, account, from, to, cancel, &mut report)
                .await
            {
                Ok(()) => report.accounts_synced += 1,
                Err(AccountError::Provider(ProviderError::Cancelled)) => {
                    report.cancelled = true;
                    break;
                }
                Err(AccountError::Provider(e)) => {
                    tracing::warn!(
                        connection_id,
                        account = %account.account_number,
                        error = %e,
                        "Account sync failed",
                    );
                    report.accounts_failed.push(AccountFailure {
                        account_number: account.account_number.clone(),
                        reason: e.user_message().to_string(),
                    });
                    if aborts_sync(&e) {
                        self.lifecycle.record_provider_failure(&connection, &e).await;
                        report.aborted = true;
                        break;
                    }
                }
                Err(AccountError::Store(e)) => {
                    tracing::error!(
                        connection_id,
                        account = %account.account_number,
                        error = %e,
                        "Failed to persist account data",
                    );
                    report.accounts_failed.push(AccountFailure {
                        account_number: account.account_number.clone(),
                        reason: "Failed to save account data".to_string(),
                    });
                }
            }
        }

        if !report.cancelled && !report.aborted && report.accounts_synced > 0 {
            if report.accounts_failed.is_empty() {
                ctx.store
                    .mark_connection_synced(connection_id, started_at)
                    .await?;
            } else {
                tracing::debug!(
                    connection_id,
                    failed = report.accounts_failed.len(),
                    "Keeping previous sync checkpoint until every account succeeds",
                );
            }
            ctx.events.publish(DomainEvent::connection_synced(
                connection.user_id,
                connection_id,
                report.transactions_inserted,
                report.accounts_failed.len(),
            ));
        }

        tracing::info!(
            connection_id,
            accounts = report.accounts_total,
            synced = report.accounts_synced,
            failed = report.accounts_failed.len(),
            inserted = report.transactions_inserted,
            skipped = report.transactions_skipped,
            cancelled = report.cancelled,
            "Connection sync finished",
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn sync_account(
        &self,
        connection: &BankConnection,
        session: &Session,
        account: &Account,
        from: NaiveDate,
        to: NaiveDate,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<(), AccountError> {
        let ctx = self.lifecycle.context();
        let retry = &ctx.retry;
        let provider = &ctx.provider;
        let account_number = account.account_number.as_str();
        let context_base = format!("sync:{}:{}", connection.id, account_number);

        let balance_context = format!("{context_base}:balance");
        let balance = retry
            .run_with_cancel(&balance_context, cancel, || {
                provider.get_account_balance(session, account_number)
            })
            .await?;
        if self
            .record_balance(connection.id, account, &balance, Utc::now())
            .await?
        {
            report.balances_recorded += 1;
        }

        let page_context = format!("{context_base}:transactions");
        let page_context = page_context.as_str();
        let records = collect_pages(move |page| async move {
            retry
                .run_with_cancel(page_context, cancel, || {
                    provider.get_account_transactions(session, account_number, from, to, page)
                })
                .await
        })
        .await?;

        let mut rows = Vec::with_capacity(records.len());
        for value in records {
            let parsed = match ProviderTransaction::from_value(value) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(connection_id = connection.id, account = %account_number, error = %e, "Skipping malformed transaction");
                    report.transactions_skipped += 1;
                    continue;
                }
            };
            match normalize_transaction(&parsed.to_raw()) {
                Ok(normalized) => {
                    let metadata = serde_json::json!({
                        "transaction_type": parsed.transaction_type,
                        "debit_credit": parsed.debit_credit,
                        "value_date": parsed.value_date,
                    });
                    rows.push(NewTransaction::from_normalized(
                        connection.id,
                        account_number,
                        normalized,
                        metadata,
                    ));
                }
                Err(e) => {
                    tracing::warn!(connection_id = connection.id, account = %account_number, error = %e, "Skipping invalid transaction");
                    report.transactions_skipped += 1;
                }
            }
        }

        for batch in rows.chunks(INSERT_BATCH_SIZE) {
            report.transactions_inserted += ctx.store.insert_transactions(batch).await?;
        }
        Ok(())
    }

    /// Insert a balance snapshot unless it repeats a recent one. Returns
    /// whether a row was written.
    async fn record_balance(
        &self,
        connection_id: DbId,
        account: &Account,
        data: &AccountBalanceData,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let Some(snapshot) = balance_snapshot(connection_id, account, data, now) else {
            tracing::warn!(connection_id, account = %account.account_number, "Balance response has no figures");
            return Ok(false);
        };

        let store = &self.lifecycle.context().store;
        if let Some(latest) = store
            .latest_balance(connection_id, &account.account_number)
            .await?
        {
            let age = now - latest.balance_date;
            if latest.same_figures(&snapshot)
                && age < chrono::Duration::hours(BALANCE_SNAPSHOT_MAX_AGE_HOURS)
            {
                return Ok(false);
            }
        }
        store.insert_balance(&snapshot).await?;
        Ok(true)
    }

    /// Sync every active connection of a user concurrently, one task per
    /// connection.
    pub async fn sync_user(
        &self,
        user_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<UserSyncSummary, SyncError> {
        let connections = self
            .lifecycle
            .context()
            .store
            .list_user_connections(user_id)
            .await?;

        let mut tasks = JoinSet::new();
        for connection in connections
            .into_iter()
            .filter(|c| c.status() == ConnectionStatus::Active)
        {
            let engine = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = engine.sync_connection(connection.id, &cancel).await;
                (connection, result)
            });
        }

        let mut summary = UserSyncSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => {
                    summary.transactions_inserted += report.transactions_inserted;
                    summary.reports.push(report);
                }
                Ok((connection, Err(e))) => {
                    tracing::warn!(connection_id = connection.id, user_id, error = %e, "Connection sync failed");
                    summary.failures.push(AccountFailure {
                        account_number: connection.account_number,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(user_id, error = %e, "Sync task panicked");
                }
            }
        }
        summary.reports.sort_by_key(|r| r.connection_id);
        Ok(summary)
    }
}

/// 401 and 403 end a sync; other account failures do not.
fn aborts_sync(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::Unauthorized { .. } | ProviderError::Forbidden { .. }
    )
}

/// Build a snapshot from whichever figures the provider sent. Missing
/// figures fall back to the current balance.
fn balance_snapshot(
    connection_id: DbId,
    account: &Account,
    data: &AccountBalanceData,
    now: Timestamp,
) -> Option<NewAccountBalance> {
    let current = data
        .current_balance
        .or(data.ledger_balance)
        .or(data.available_balance)
        .and_then(to_minor_units)?;
    let available = data
        .available_balance
        .and_then(to_minor_units)
        .unwrap_or(current);
    let ledger = data
        .effective_ledger()
        .and_then(to_minor_units)
        .unwrap_or(current);
    let currency = data
        .currency
        .clone()
        .or_else(|| account.currency.clone())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    Some(NewAccountBalance {
        bank_connection_id: connection_id,
        account_number: account.account_number.clone(),
        current_balance: current,
        available_balance: available,
        ledger_balance: ledger,
        currency,
        balance_date: now,
        metadata: serde_json::json!({ "account_name": account.account_name }),
    })
}
