//! Bill payment intent models.

use ledgerlink_core::status::{BillPaymentStatus, StatusId};
use ledgerlink_core::types::{DbId, MinorUnits, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `bill_payments` table, keyed by provider reference.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BillPayment {
    pub id: DbId,
    pub user_id: DbId,
    pub bank_connection_id: Option<DbId>,
    pub biller_id: String,
    pub customer_reference: String,
    pub amount: MinorUnits,
    pub external_reference: String,
    pub status_id: StatusId,
    pub status_message: Option<String>,
    pub metadata: serde_json::Value,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BillPayment {
    pub fn status(&self) -> BillPaymentStatus {
        BillPaymentStatus::from_id(self.status_id).unwrap_or(BillPaymentStatus::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct NewBillPayment {
    pub user_id: DbId,
    pub bank_connection_id: Option<DbId>,
    pub biller_id: String,
    pub customer_reference: String,
    pub amount: MinorUnits,
    pub external_reference: String,
    pub status: BillPaymentStatus,
    pub status_message: Option<String>,
    pub metadata: serde_json::Value,
}
