//! Credit scoring over a user's imported ledger.

use chrono::{Months, Utc};

use ledgerlink_core::scoring::{self, InsufficientData, DEFAULT_WINDOW_MONTHS};
use ledgerlink_core::types::DbId;
use ledgerlink_db::models::credit_score::{CreditScore, NewCreditScore};
use ledgerlink_db::store::StoreError;
use ledgerlink_events::DomainEvent;

use crate::context::EngineContext;

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Insufficient transaction data: found {found}, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("User {0} not found")]
    UserNotFound(DbId),

    #[error("Credit scoring failed: {0}")]
    Failed(String),
}

impl From<InsufficientData> for ScoringError {
    fn from(e: InsufficientData) -> Self {
        Self::InsufficientData {
            found: e.found,
            required: e.required,
        }
    }
}

impl From<StoreError> for ScoringError {
    fn from(e: StoreError) -> Self {
        Self::Failed(e.to_string())
    }
}

#[derive(Clone)]
pub struct CreditScoringEngine {
    ctx: EngineContext,
}

impl CreditScoringEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Score the user's last `months` of transactions (6 when `None`),
    /// persist the score and the refreshed financial profile, and announce
    /// the result. Nothing is written when data is insufficient.
    pub async fn calculate(
        &self,
        user_id: DbId,
        months: Option<u32>,
    ) -> Result<CreditScore, ScoringError> {
        let store = &self.ctx.store;
        let user = store
            .find_user(user_id)
            .await?
            .ok_or(ScoringError::UserNotFound(user_id))?;

        let now = Utc::now();
        let today = now.date_naive();
        let months = months.unwrap_or(DEFAULT_WINDOW_MONTHS).max(1);
        let since = today
            .checked_sub_months(Months::new(months))
            .ok_or_else(|| ScoringError::Failed(format!("invalid window of {months} months")))?;

        let ledger: Vec<_> = store
            .list_user_transactions_since(user_id, since)
            .await?
            .iter()
            .map(|t| t.to_scoring())
            .collect();

        let account_age = store
            .earliest_connection_created_at(user_id)
            .await?
            .map(|earliest| scoring::account_age_months(earliest, now))
            .unwrap_or(0.0);

        let assessment = match scoring::assess(&ledger, account_age, &user.demographics(today)) {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::info!(user_id, found = e.found, required = e.required, "Not enough data to score");
                return Err(e.into());
            }
        };

        let input = NewCreditScore::from_assessment(user_id, &assessment)
            .map_err(|e| ScoringError::Failed(e.to_string()))?;
        let score = store.insert_credit_score(&input).await?;
        store
            .upsert_financial_profile(user_id, &assessment.features)
            .await?;

        tracing::info!(
            user_id,
            score = score.score,
            grade = assessment.grade.as_str(),
            risk_level = assessment.risk_level.as_str(),
            transactions = ledger.len(),
            "Credit score calculated",
        );
        self.ctx.events.publish(DomainEvent::credit_score_calculated(
            user_id,
            score.score,
            assessment.grade.as_str(),
            assessment.risk_level.as_str(),
        ));
        Ok(score)
    }

    pub async fn latest(&self, user_id: DbId) -> Result<Option<CreditScore>, ScoringError> {
        Ok(self.ctx.store.latest_credit_score(user_id).await?)
    }
}
