//! Repository for the `bill_payments` table.

use ledgerlink_core::status::BillPaymentStatus;
use sqlx::PgPool;

use crate::models::bill_payment::{BillPayment, NewBillPayment};

const COLUMNS: &str = "\
    id, user_id, bank_connection_id, biller_id, customer_reference, amount, \
    external_reference, status_id, status_message, metadata, completed_at, \
    created_at, updated_at";

pub struct BillPaymentRepo;

impl BillPaymentRepo {
    pub async fn insert(pool: &PgPool, input: &NewBillPayment) -> Result<BillPayment, sqlx::Error> {
        let query = format!(
            "INSERT INTO bill_payments \
                 (user_id, bank_connection_id, biller_id, customer_reference, amount, \
                  external_reference, status_id, status_message, metadata, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, CASE WHEN $10 THEN NOW() END) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BillPayment>(&query)
            .bind(input.user_id)
            .bind(input.bank_connection_id)
            .bind(&input.biller_id)
            .bind(&input.customer_reference)
            .bind(input.amount)
            .bind(&input.external_reference)
            .bind(input.status.id())
            .bind(&input.status_message)
            .bind(&input.metadata)
            .bind(input.status.is_terminal())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_reference(
        pool: &PgPool,
        external_reference: &str,
    ) -> Result<Option<BillPayment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bill_payments WHERE external_reference = $1");
        sqlx::query_as::<_, BillPayment>(&query)
            .bind(external_reference)
            .fetch_optional(pool)
            .await
    }

    /// Update status by provider reference. Terminal statuses stamp
    /// `completed_at` once.
    pub async fn update_status_by_reference(
        pool: &PgPool,
        external_reference: &str,
        status: BillPaymentStatus,
        status_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE bill_payments SET \
                 status_id = $2, \
                 status_message = COALESCE($3, status_message), \
                 completed_at = CASE WHEN $4 THEN COALESCE(completed_at, NOW()) ELSE completed_at END, \
                 updated_at = NOW() \
             WHERE external_reference = $1",
        )
        .bind(external_reference)
        .bind(status.id())
        .bind(status_message)
        .bind(status.is_terminal())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
