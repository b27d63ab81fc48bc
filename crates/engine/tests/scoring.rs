mod common;

use assert_matches::assert_matches;
use chrono::{Days, Utc};
use tokio_util::sync::CancellationToken;

use ledgerlink_engine::{
    BillPaymentRequest, BillPayments, CreditScoringEngine, PaymentError, ScoringError, SyncEngine,
};
use ledgerlink_events::bus::CREDIT_SCORE_CALCULATED;

use common::{txn, Harness};

const ACCOUNT: &str = "0123456789";

/// Monthly salary plus a few debits, spread over the last three months.
fn ledger(count: usize) -> Vec<serde_json::Value> {
    let today = Utc::now().date_naive();
    (0..count)
        .map(|i| {
            let date = (today - Days::new(5 + (i as u64 * 7))).to_string();
            if i % 4 == 0 {
                txn(&format!("S{i}"), 200_000.0, "credit", &date, "SALARY")
            } else {
                txn(&format!("D{i}"), 15_000.0, "debit", &date, "POS PURCHASE SHOPRITE")
            }
        })
        .collect()
}

async fn seeded(count: usize) -> (Harness, i64) {
    let h = Harness::new();
    let user = h.user();
    let connection = h.active_connection(user.id, ACCOUNT).await;
    h.provider.set_transactions(ACCOUNT, ledger(count));
    SyncEngine::new(h.lifecycle.clone())
        .sync_connection(connection.id, &CancellationToken::new())
        .await
        .unwrap();
    (h, user.id)
}

#[tokio::test]
async fn scoring_persists_score_profile_and_event() {
    let (h, user_id) = seeded(12).await;
    let mut events = h.events.subscribe();

    let score = CreditScoringEngine::new(h.ctx.clone())
        .calculate(user_id, None)
        .await
        .unwrap();
    assert!((300..=850).contains(&score.score));
    assert_eq!(score.model_version, "1.0");
    assert_eq!(score.features["transaction_count"], 12);

    assert_eq!(h.store.credit_scores(user_id).len(), 1);
    let profile = h.store.financial_profile(user_id).unwrap();
    assert_eq!(profile.transaction_count, 12);
    assert!(profile.avg_monthly_income > 0.0);

    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, CREDIT_SCORE_CALCULATED);
    assert_eq!(event.payload["score"], score.score);
}

#[tokio::test]
async fn repeated_scoring_is_deterministic() {
    let (h, user_id) = seeded(12).await;
    let engine = CreditScoringEngine::new(h.ctx.clone());

    let first = engine.calculate(user_id, Some(6)).await.unwrap();
    let second = engine.calculate(user_id, Some(6)).await.unwrap();
    assert_eq!(first.score, second.score);
    assert_eq!(first.grade, second.grade);
    assert_eq!(engine.latest(user_id).await.unwrap().unwrap().id, second.id);
}

#[tokio::test]
async fn insufficient_data_writes_nothing() {
    let (h, user_id) = seeded(5).await;

    let err = CreditScoringEngine::new(h.ctx.clone())
        .calculate(user_id, None)
        .await
        .unwrap_err();
    assert_matches!(err, ScoringError::InsufficientData { found: 5, required: 10 });
    assert!(h.store.credit_scores(user_id).is_empty());
    assert!(h.store.financial_profile(user_id).is_none());
}

#[tokio::test]
async fn transactions_outside_the_window_are_ignored() {
    let (h, user_id) = seeded(12).await;

    // A one-month window sees only the most recent handful of rows.
    let err = CreditScoringEngine::new(h.ctx.clone())
        .calculate(user_id, Some(1))
        .await
        .unwrap_err();
    assert_matches!(err, ScoringError::InsufficientData { found, .. } if found < 10);
}

#[tokio::test]
async fn unknown_user_is_reported() {
    let h = Harness::new();
    let err = CreditScoringEngine::new(h.ctx.clone())
        .calculate(99, None)
        .await
        .unwrap_err();
    assert_matches!(err, ScoringError::UserNotFound(99));
}

#[tokio::test]
async fn bill_payment_needs_an_active_connection_and_positive_amount() {
    let h = Harness::new();
    let user = h.user();
    let started = h
        .lifecycle
        .initiate(Harness::new_connection(user.id, ACCOUNT))
        .await
        .unwrap();
    let payments = BillPayments::new(h.lifecycle.clone());
    let request = |amount| BillPaymentRequest {
        category_id: "1".into(),
        biller_id: "IKEDC".into(),
        bill_reference: "METER-1".into(),
        amount,
        narration: Some("Electricity".into()),
    };

    assert_matches!(
        payments.pay_bill(started.connection.id, request(0)).await,
        Err(PaymentError::InvalidAmount)
    );
    assert_matches!(
        payments.pay_bill(started.connection.id, request(500_000)).await,
        Err(PaymentError::NotActive { .. })
    );
    assert_eq!(h.provider.calls_to("pay_bill"), 0);
}

#[tokio::test]
async fn successful_payment_is_recorded_as_terminal() {
    let h = Harness::new();
    let user = h.user();
    let connection = h.active_connection(user.id, ACCOUNT).await;
    *h.provider.payment_status.lock().unwrap() = "successful".into();

    let payment = BillPayments::new(h.lifecycle.clone())
        .pay_bill(
            connection.id,
            BillPaymentRequest {
                category_id: "1".into(),
                biller_id: "IKEDC".into(),
                bill_reference: "METER-1".into(),
                amount: 500_000,
                narration: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(payment.external_reference, "PAY-METER-1");
    assert_eq!(payment.user_id, user.id);
    assert!(payment.completed_at.is_some());
}
