//! Ledger transaction models.

use chrono::NaiveDate;
use ledgerlink_core::normalize::NormalizedTransaction;
use ledgerlink_core::scoring::ScoringTransaction;
use ledgerlink_core::types::{DbId, MinorUnits, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `transactions` table.
///
/// `(bank_connection_id, external_transaction_id)` is unique.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: DbId,
    pub bank_connection_id: DbId,
    pub account_number: String,
    pub external_transaction_id: String,
    pub amount: MinorUnits,
    pub direction: String,
    pub category: String,
    pub description: String,
    pub reference: Option<String>,
    pub status: Option<String>,
    pub transaction_date: NaiveDate,
    pub balance_after: Option<MinorUnits>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Transaction {
    pub fn to_scoring(&self) -> ScoringTransaction {
        ScoringTransaction {
            amount: self.amount,
            description: self.description.clone(),
            transaction_date: self.transaction_date,
            balance_after: self.balance_after,
        }
    }
}

/// DTO for inserting a ledger row.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub bank_connection_id: DbId,
    pub account_number: String,
    pub external_transaction_id: String,
    pub amount: MinorUnits,
    pub direction: String,
    pub category: String,
    pub description: String,
    pub reference: Option<String>,
    pub transaction_date: NaiveDate,
    pub balance_after: Option<MinorUnits>,
    pub metadata: serde_json::Value,
}

impl NewTransaction {
    pub fn from_normalized(
        bank_connection_id: DbId,
        account_number: &str,
        normalized: NormalizedTransaction,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            bank_connection_id,
            account_number: account_number.to_string(),
            external_transaction_id: normalized.external_transaction_id,
            amount: normalized.amount,
            direction: normalized.direction.as_str().to_string(),
            category: normalized.category.as_str().to_string(),
            description: normalized.description,
            reference: normalized.reference,
            transaction_date: normalized.transaction_date,
            balance_after: normalized.balance_after,
            metadata,
        }
    }
}
