//! Repository for the `financial_profiles` table.

use ledgerlink_core::scoring::Features;
use ledgerlink_core::types::DbId;
use sqlx::PgPool;

use crate::models::financial_profile::FinancialProfile;

const COLUMNS: &str = "\
    id, user_id, avg_monthly_income, avg_monthly_expenses, savings_rate, \
    debt_to_income, income_stability, spending_volatility, transaction_count, \
    created_at, updated_at";

pub struct FinancialProfileRepo;

impl FinancialProfileRepo {
    /// Insert or overwrite the user's profile from freshly extracted features.
    pub async fn upsert(
        pool: &PgPool,
        user_id: DbId,
        features: &Features,
    ) -> Result<FinancialProfile, sqlx::Error> {
        let query = format!(
            "INSERT INTO financial_profiles \
                 (user_id, avg_monthly_income, avg_monthly_expenses, savings_rate, \
                  debt_to_income, income_stability, spending_volatility, transaction_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 avg_monthly_income = EXCLUDED.avg_monthly_income, \
                 avg_monthly_expenses = EXCLUDED.avg_monthly_expenses, \
                 savings_rate = EXCLUDED.savings_rate, \
                 debt_to_income = EXCLUDED.debt_to_income, \
                 income_stability = EXCLUDED.income_stability, \
                 spending_volatility = EXCLUDED.spending_volatility, \
                 transaction_count = EXCLUDED.transaction_count, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FinancialProfile>(&query)
            .bind(user_id)
            .bind(features.avg_monthly_income)
            .bind(features.avg_monthly_expenses)
            .bind(features.savings_rate)
            .bind(features.debt_to_income)
            .bind(features.income_stability)
            .bind(features.spending_volatility)
            .bind(i32::try_from(features.transaction_count).unwrap_or(i32::MAX))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_user(pool: &PgPool, user_id: DbId) -> Result<Option<FinancialProfile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM financial_profiles WHERE user_id = $1");
        sqlx::query_as::<_, FinancialProfile>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }
}
