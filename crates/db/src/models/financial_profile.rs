//! Derived financial profile, refreshed by every scoring run.

use ledgerlink_core::scoring::Features;
use ledgerlink_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `financial_profiles` table. One per user.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FinancialProfile {
    pub id: DbId,
    pub user_id: DbId,
    pub avg_monthly_income: f64,
    pub avg_monthly_expenses: f64,
    pub savings_rate: f64,
    pub debt_to_income: f64,
    pub income_stability: f64,
    pub spending_volatility: f64,
    pub transaction_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl FinancialProfile {
    /// Overwrite the derived figures from `features`.
    pub fn apply(&mut self, features: &Features, now: Timestamp) {
        self.avg_monthly_income = features.avg_monthly_income;
        self.avg_monthly_expenses = features.avg_monthly_expenses;
        self.savings_rate = features.savings_rate;
        self.debt_to_income = features.debt_to_income;
        self.income_stability = features.income_stability;
        self.spending_volatility = features.spending_volatility;
        self.transaction_count = i32::try_from(features.transaction_count).unwrap_or(i32::MAX);
        self.updated_at = now;
    }
}
