//! Balance snapshot models.

use ledgerlink_core::types::{DbId, MinorUnits, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `account_balances` table. Append-only.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AccountBalance {
    pub id: DbId,
    pub bank_connection_id: DbId,
    pub account_number: String,
    pub current_balance: MinorUnits,
    pub available_balance: MinorUnits,
    pub ledger_balance: MinorUnits,
    pub currency: String,
    pub balance_date: Timestamp,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

impl AccountBalance {
    /// Whether the three balance figures equal `other`'s.
    pub fn same_figures(&self, other: &NewAccountBalance) -> bool {
        self.current_balance == other.current_balance
            && self.available_balance == other.available_balance
            && self.ledger_balance == other.ledger_balance
    }
}

/// DTO for inserting a snapshot.
#[derive(Debug, Clone)]
pub struct NewAccountBalance {
    pub bank_connection_id: DbId,
    pub account_number: String,
    pub current_balance: MinorUnits,
    pub available_balance: MinorUnits,
    pub ledger_balance: MinorUnits,
    pub currency: String,
    pub balance_date: Timestamp,
    pub metadata: serde_json::Value,
}
