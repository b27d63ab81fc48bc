//! Credit score snapshots. Immutable once written.

use ledgerlink_core::scoring::CreditAssessment;
use ledgerlink_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `credit_scores` table. A user's current score is the
/// most recently calculated row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditScore {
    pub id: DbId,
    pub user_id: DbId,
    pub score: i32,
    pub grade: String,
    pub risk_level: String,
    pub default_probability: f64,
    pub breakdown: serde_json::Value,
    pub features: serde_json::Value,
    pub risk_factors: serde_json::Value,
    pub improvement_suggestions: serde_json::Value,
    pub model_version: String,
    pub calculated_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewCreditScore {
    pub user_id: DbId,
    pub score: i32,
    pub grade: String,
    pub risk_level: String,
    pub default_probability: f64,
    pub breakdown: serde_json::Value,
    pub features: serde_json::Value,
    pub risk_factors: serde_json::Value,
    pub improvement_suggestions: serde_json::Value,
    pub model_version: String,
}

impl NewCreditScore {
    pub fn from_assessment(
        user_id: DbId,
        assessment: &CreditAssessment,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            user_id,
            score: assessment.score,
            grade: assessment.grade.as_str().to_string(),
            risk_level: assessment.risk_level.as_str().to_string(),
            default_probability: assessment.default_probability,
            breakdown: serde_json::to_value(&assessment.breakdown)?,
            features: serde_json::to_value(&assessment.features)?,
            risk_factors: serde_json::to_value(&assessment.risk_factors)?,
            improvement_suggestions: serde_json::to_value(&assessment.improvement_suggestions)?,
            model_version: assessment.model_version.to_string(),
        })
    }
}
