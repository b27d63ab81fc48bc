//! Repository for the `transactions` table.

use chrono::NaiveDate;
use ledgerlink_core::types::DbId;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::models::transaction::{NewTransaction, Transaction};

const COLUMNS: &str = "\
    id, bank_connection_id, account_number, external_transaction_id, amount, \
    direction, category, description, reference, status, transaction_date, \
    balance_after, metadata, created_at, updated_at";

/// Prefixed variant for joins.
const T_COLUMNS: &str = "\
    t.id, t.bank_connection_id, t.account_number, t.external_transaction_id, t.amount, \
    t.direction, t.category, t.description, t.reference, t.status, t.transaction_date, \
    t.balance_after, t.metadata, t.created_at, t.updated_at";

pub struct TransactionRepo;

impl TransactionRepo {
    /// Multi-row insert that skips rows whose dedup key already exists.
    ///
    /// Returns the number of rows inserted.
    pub async fn insert_batch(pool: &PgPool, rows: &[NewTransaction]) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO transactions \
                 (bank_connection_id, account_number, external_transaction_id, amount, direction, \
                  category, description, reference, transaction_date, balance_after, metadata) ",
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.bank_connection_id)
                .push_bind(row.account_number.as_str())
                .push_bind(row.external_transaction_id.as_str())
                .push_bind(row.amount)
                .push_bind(row.direction.as_str())
                .push_bind(row.category.as_str())
                .push_bind(row.description.as_str())
                .push_bind(row.reference.as_deref())
                .push_bind(row.transaction_date)
                .push_bind(row.balance_after)
                .push_bind(&row.metadata);
        });
        builder.push(" ON CONFLICT (bank_connection_id, external_transaction_id) DO NOTHING");

        let result = builder.build().execute(pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn list_for_user_since(
        pool: &PgPool,
        user_id: DbId,
        since: NaiveDate,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let query = format!(
            "SELECT {T_COLUMNS} FROM transactions t \
             JOIN bank_connections c ON c.id = t.bank_connection_id \
             WHERE c.user_id = $1 AND t.transaction_date >= $2 \
             ORDER BY t.transaction_date ASC, t.id ASC"
        );
        sqlx::query_as::<_, Transaction>(&query)
            .bind(user_id)
            .bind(since)
            .fetch_all(pool)
            .await
    }

    pub async fn list_for_connection(
        pool: &PgPool,
        bank_connection_id: DbId,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM transactions WHERE bank_connection_id = $1 \
             ORDER BY transaction_date ASC, id ASC"
        );
        sqlx::query_as::<_, Transaction>(&query)
            .bind(bank_connection_id)
            .fetch_all(pool)
            .await
    }

    /// Update the status of the transaction with `reference`, merging
    /// `metadata` into the stored JSON.
    pub async fn update_status_by_reference(
        pool: &PgPool,
        reference: &str,
        status: &str,
        metadata: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $2, metadata = metadata || $3, updated_at = NOW() \
             WHERE reference = $1",
        )
        .bind(reference)
        .bind(status)
        .bind(metadata)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
