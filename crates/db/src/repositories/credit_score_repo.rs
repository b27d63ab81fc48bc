//! Repository for the `credit_scores` table. Insert and read only.

use ledgerlink_core::types::DbId;
use sqlx::PgPool;

use crate::models::credit_score::{CreditScore, NewCreditScore};

const COLUMNS: &str = "\
    id, user_id, score, grade, risk_level, default_probability, breakdown, \
    features, risk_factors, improvement_suggestions, model_version, calculated_at";

pub struct CreditScoreRepo;

impl CreditScoreRepo {
    pub async fn insert(pool: &PgPool, input: &NewCreditScore) -> Result<CreditScore, sqlx::Error> {
        let query = format!(
            "INSERT INTO credit_scores \
                 (user_id, score, grade, risk_level, default_probability, breakdown, \
                  features, risk_factors, improvement_suggestions, model_version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CreditScore>(&query)
            .bind(input.user_id)
            .bind(input.score)
            .bind(&input.grade)
            .bind(&input.risk_level)
            .bind(input.default_probability)
            .bind(&input.breakdown)
            .bind(&input.features)
            .bind(&input.risk_factors)
            .bind(&input.improvement_suggestions)
            .bind(&input.model_version)
            .fetch_one(pool)
            .await
    }

    pub async fn latest_for_user(pool: &PgPool, user_id: DbId) -> Result<Option<CreditScore>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM credit_scores WHERE user_id = $1 \
             ORDER BY calculated_at DESC, id DESC LIMIT 1"
        );
        sqlx::query_as::<_, CreditScore>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }
}
