//! Repository for the `account_balances` table.

use ledgerlink_core::types::DbId;
use sqlx::PgPool;

use crate::models::account_balance::{AccountBalance, NewAccountBalance};

const COLUMNS: &str = "\
    id, bank_connection_id, account_number, current_balance, available_balance, \
    ledger_balance, currency, balance_date, metadata, created_at";

pub struct AccountBalanceRepo;

impl AccountBalanceRepo {
    pub async fn insert(pool: &PgPool, input: &NewAccountBalance) -> Result<AccountBalance, sqlx::Error> {
        let query = format!(
            "INSERT INTO account_balances \
                 (bank_connection_id, account_number, current_balance, available_balance, \
                  ledger_balance, currency, balance_date, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountBalance>(&query)
            .bind(input.bank_connection_id)
            .bind(&input.account_number)
            .bind(input.current_balance)
            .bind(input.available_balance)
            .bind(input.ledger_balance)
            .bind(&input.currency)
            .bind(input.balance_date)
            .bind(&input.metadata)
            .fetch_one(pool)
            .await
    }

    /// Most recent snapshot for one account of a connection.
    pub async fn latest(
        pool: &PgPool,
        bank_connection_id: DbId,
        account_number: &str,
    ) -> Result<Option<AccountBalance>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM account_balances \
             WHERE bank_connection_id = $1 AND account_number = $2 \
             ORDER BY balance_date DESC, id DESC LIMIT 1"
        );
        sqlx::query_as::<_, AccountBalance>(&query)
            .bind(bank_connection_id)
            .bind(account_number)
            .fetch_optional(pool)
            .await
    }

    /// Delete all but the newest `keep` snapshots of each connection.
    pub async fn prune(pool: &PgPool, keep: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM account_balances WHERE id IN ( \
                 SELECT id FROM ( \
                     SELECT id, ROW_NUMBER() OVER ( \
                         PARTITION BY bank_connection_id ORDER BY balance_date DESC, id DESC \
                     ) AS rn FROM account_balances \
                 ) ranked WHERE rn > $1 \
             )",
        )
        .bind(keep)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
