mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use ledgerlink_core::hashing::sha256_hex;
use ledgerlink_core::signing::compute_signature;
use ledgerlink_core::status::{BillPaymentStatus, ConnectionStatus, WebhookEventStatus};
use ledgerlink_engine::webhook::{CONSENT_STATUS_EVENT, TRANSFER_STATUS_EVENT};
use ledgerlink_engine::{
    BillPaymentRequest, BillPayments, Recorded, SyncEngine, WebhookError, WebhookHeaders,
    WebhookProcessor,
};

use common::{token, txn, Harness, CLIENT_SECRET};

fn processor(h: &Harness) -> WebhookProcessor {
    WebhookProcessor::new(h.lifecycle.clone())
}

async fn record(p: &WebhookProcessor, event_type: &str, event_id: &str, payload: serde_json::Value) -> i64 {
    match p.record(event_type, Some(event_id), None, payload).await.unwrap() {
        Recorded::New(event) => event.id,
        Recorded::Duplicate => panic!("expected a new event"),
    }
}

#[tokio::test]
async fn signature_is_checked_against_client_secret() {
    let h = Harness::new();
    let p = processor(&h);
    let signature = compute_signature(CLIENT_SECRET, "key-1", Some("tok"));

    let valid = WebhookHeaders {
        idempotency_key: Some("key-1"),
        authorization: Some("Bearer tok"),
        signature: Some(&signature),
    };
    assert!(p.verify(&valid).is_ok());

    let wrong_key = WebhookHeaders {
        idempotency_key: Some("key-2"),
        ..valid
    };
    assert_matches!(p.verify(&wrong_key), Err(WebhookError::InvalidSignature));

    let no_signature = WebhookHeaders {
        signature: None,
        ..valid
    };
    assert_matches!(p.verify(&no_signature), Err(WebhookError::MissingHeader("signature")));
}

#[tokio::test]
async fn empty_bearer_token_signs_an_empty_segment() {
    let h = Harness::new();
    let p = processor(&h);
    let signature = format!("SHA-256({})", sha256_hex(format!("{CLIENT_SECRET};key-1;").as_bytes()));

    for authorization in ["Bearer ", "Bearer"] {
        let headers = WebhookHeaders {
            idempotency_key: Some("key-1"),
            authorization: Some(authorization),
            signature: Some(&signature),
        };
        assert!(p.verify(&headers).is_ok(), "{authorization:?}");
    }

    // Without the header the token segment is left out entirely.
    let absent = WebhookHeaders {
        idempotency_key: Some("key-1"),
        authorization: None,
        signature: Some(&signature),
    };
    assert_matches!(p.verify(&absent), Err(WebhookError::InvalidSignature));
    let unsigned_token = compute_signature(CLIENT_SECRET, "key-1", None);
    assert!(p
        .verify(&WebhookHeaders {
            signature: Some(&unsigned_token),
            ..absent
        })
        .is_ok());
}

#[tokio::test]
async fn only_the_bearer_scheme_contributes_a_token() {
    let h = Harness::new();
    let p = processor(&h);

    let glued = compute_signature(CLIENT_SECRET, "key-1", Some("token"));
    let headers = WebhookHeaders {
        idempotency_key: Some("key-1"),
        authorization: Some("Bearertoken"),
        signature: Some(&glued),
    };
    assert_matches!(p.verify(&headers), Err(WebhookError::InvalidSignature));

    let basic = compute_signature(CLIENT_SECRET, "key-1", None);
    let headers = WebhookHeaders {
        authorization: Some("Basic Y2xpZW50OnNlY3JldA=="),
        signature: Some(&basic),
        ..headers
    };
    assert!(p.verify(&headers).is_ok());
}

#[tokio::test]
async fn duplicate_delivery_is_recorded_and_applied_once() {
    let h = Harness::new();
    let user = h.user();
    let connection = h.active_connection(user.id, "0123456789").await;
    h.store.update_connection(connection.id, |c| c.consent_id = Some("C1".into()));
    let p = processor(&h);
    let payload = json!({ "data": { "consent_id": "C1", "consent_status": "revoked" } });
    let mut events = h.events.subscribe();

    let id = record(&p, CONSENT_STATUS_EVENT, "evt-1", payload.clone()).await;
    assert_eq!(p.process(id).await.unwrap(), WebhookEventStatus::Completed);

    let again = p
        .record(CONSENT_STATUS_EVENT, Some("evt-1"), None, payload)
        .await
        .unwrap();
    assert_matches!(again, Recorded::Duplicate);
    assert_eq!(h.store.webhook_events().len(), 1);

    // Processing a completed event is a no-op.
    assert_eq!(p.process(id).await.unwrap(), WebhookEventStatus::Completed);

    assert_eq!(
        h.lifecycle.load(connection.id).await.unwrap().status(),
        ConnectionStatus::Revoked
    );
    assert!(events.try_recv().is_ok());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn event_id_falls_back_to_idempotency_key() {
    let h = Harness::new();
    let p = processor(&h);
    let payload = json!({ "data": { "reference": "R1", "status": "successful" } });

    let recorded = p
        .record(TRANSFER_STATUS_EVENT, None, Some("idem-7"), payload.clone())
        .await
        .unwrap();
    assert_matches!(recorded, Recorded::New(ref e) if e.event_id == "idem-7");

    let generated = p.record(TRANSFER_STATUS_EVENT, None, None, payload).await.unwrap();
    assert_matches!(generated, Recorded::New(ref e) if e.event_id.len() == 36);
}

#[tokio::test]
async fn unsupported_event_types_are_rejected() {
    let h = Harness::new();
    let err = processor(&h)
        .record("loan_status", Some("e1"), None, json!({}))
        .await
        .unwrap_err();
    assert_matches!(err, WebhookError::UnsupportedEvent(_));
    assert!(h.store.webhook_events().is_empty());
}

#[tokio::test]
async fn approval_completes_a_pending_device_flow() {
    let h = Harness::new();
    let user = h.user();
    let started = h
        .lifecycle
        .initiate(Harness::new_connection(user.id, "0123456789"))
        .await
        .unwrap();
    h.provider.polls.lock().unwrap().push_back(Ok(token("tok")));
    let p = processor(&h);

    let id = record(
        &p,
        CONSENT_STATUS_EVENT,
        "evt-approve",
        json!({ "data": { "device_code": "D1", "consent_status": "approved" } }),
    )
    .await;
    assert_eq!(p.process(id).await.unwrap(), WebhookEventStatus::Completed);
    assert_eq!(
        h.lifecycle.load(started.connection.id).await.unwrap().status(),
        ConnectionStatus::Active
    );
}

#[tokio::test]
async fn early_approval_fails_then_succeeds_on_retry() {
    let h = Harness::new();
    let user = h.user();
    let started = h
        .lifecycle
        .initiate(Harness::new_connection(user.id, "0123456789"))
        .await
        .unwrap();
    let p = processor(&h);

    let id = record(
        &p,
        CONSENT_STATUS_EVENT,
        "evt-early",
        json!({ "data": { "device_code": "D1", "consent_status": "approved" } }),
    )
    .await;
    assert_eq!(p.process(id).await.unwrap(), WebhookEventStatus::Failed);

    h.provider.polls.lock().unwrap().push_back(Ok(token("tok")));
    let summary = p.retry_failed(Utc::now()).await.unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.completed, 1);

    let event = h.store.webhook_events().pop().unwrap();
    assert_eq!(event.status(), WebhookEventStatus::Completed);
    assert_eq!(event.attempts, 2);
    assert!(event.processed_at.is_some());
    assert_eq!(
        h.lifecycle.load(started.connection.id).await.unwrap().status(),
        ConnectionStatus::Active
    );
}

#[tokio::test]
async fn unknown_consent_fails_the_event() {
    let h = Harness::new();
    let p = processor(&h);
    let id = record(
        &p,
        CONSENT_STATUS_EVENT,
        "evt-x",
        json!({ "data": { "consent_id": "missing", "consent_status": "expired" } }),
    )
    .await;

    assert_eq!(p.process(id).await.unwrap(), WebhookEventStatus::Failed);
    let event = h.store.webhook_events().pop().unwrap();
    assert!(event.error_message.unwrap().contains("No connection"));
}

#[tokio::test]
async fn retry_sweep_skips_old_and_exhausted_events() {
    let h = Harness::new();
    let p = processor(&h);
    let payload = json!({ "data": { "consent_id": "missing", "consent_status": "expired" } });
    let old = record(&p, CONSENT_STATUS_EVENT, "old", payload.clone()).await;
    let exhausted = record(&p, CONSENT_STATUS_EVENT, "exhausted", payload.clone()).await;
    let fresh = record(&p, CONSENT_STATUS_EVENT, "fresh", payload).await;
    for id in [old, exhausted, fresh] {
        p.process(id).await.unwrap();
    }
    h.store.update_webhook_event(old, |e| {
        e.created_at = Utc::now() - chrono::Duration::hours(25);
    });
    h.store.update_webhook_event(exhausted, |e| e.attempts = 5);

    let summary = p.retry_failed(Utc::now()).await.unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn retry_sweep_recovers_abandoned_events() {
    let h = Harness::new();
    let user = h.user();
    let connection = h.active_connection(user.id, "0123456789").await;
    h.store.update_connection(connection.id, |c| c.consent_id = Some("C1".into()));
    let p = processor(&h);
    let payload = json!({ "data": { "consent_id": "C1", "consent_status": "revoked" } });

    // Recorded, but the task that should have processed it never ran.
    let never_started = record(&p, CONSENT_STATUS_EVENT, "never-started", payload.clone()).await;
    // Claimed by a worker that died before finishing.
    let abandoned = record(&p, CONSENT_STATUS_EVENT, "abandoned", payload.clone()).await;
    // Still within the grace period of its own task.
    let in_flight = record(&p, CONSENT_STATUS_EVENT, "in-flight", payload).await;

    let twenty_minutes_ago = Utc::now() - chrono::Duration::minutes(20);
    h.store.update_webhook_event(never_started, |e| {
        e.created_at = twenty_minutes_ago;
        e.updated_at = twenty_minutes_ago;
    });
    h.store.update_webhook_event(abandoned, |e| {
        e.status_id = WebhookEventStatus::Processing.id();
        e.attempts = 1;
        e.created_at = twenty_minutes_ago;
        e.updated_at = twenty_minutes_ago;
    });

    let summary = p.retry_failed(Utc::now()).await.unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.completed, 2);

    let statuses: Vec<_> = h
        .store
        .webhook_events()
        .into_iter()
        .map(|e| (e.id, e.status()))
        .collect();
    assert!(statuses.contains(&(never_started, WebhookEventStatus::Completed)));
    assert!(statuses.contains(&(abandoned, WebhookEventStatus::Completed)));
    assert!(statuses.contains(&(in_flight, WebhookEventStatus::Pending)));
    assert_eq!(
        h.lifecycle.load(connection.id).await.unwrap().status(),
        ConnectionStatus::Revoked
    );
}

#[tokio::test]
async fn transfer_status_updates_a_bill_payment() {
    let h = Harness::new();
    let user = h.user();
    let connection = h.active_connection(user.id, "0123456789").await;
    let payment = BillPayments::new(h.lifecycle.clone())
        .pay_bill(
            connection.id,
            BillPaymentRequest {
                category_id: "1".into(),
                biller_id: "DSTV".into(),
                bill_reference: "BILL1".into(),
                amount: 1_500_000,
                narration: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(payment.status(), BillPaymentStatus::Pending);
    assert!(payment.completed_at.is_none());

    let p = processor(&h);
    let id = record(
        &p,
        TRANSFER_STATUS_EVENT,
        "tr-1",
        json!({ "data": { "reference": "PAY-BILL1", "status": "successful", "status_message": "Paid" } }),
    )
    .await;
    assert_eq!(p.process(id).await.unwrap(), WebhookEventStatus::Completed);

    let stored = h.store.bill_payments().pop().unwrap();
    assert_eq!(stored.status(), BillPaymentStatus::Successful);
    assert_eq!(stored.status_message.as_deref(), Some("Paid"));
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn transfer_status_updates_a_matching_transaction() {
    let h = Harness::new();
    let user = h.user();
    let connection = h.active_connection(user.id, "0123456789").await;
    h.provider.set_transactions(
        "0123456789",
        vec![txn("T1", 5000.0, "debit", "2026-09-01", "TRANSFER TO OBI")],
    );
    SyncEngine::new(h.lifecycle.clone())
        .sync_connection(connection.id, &CancellationToken::new())
        .await
        .unwrap();

    let p = processor(&h);
    let id = record(
        &p,
        TRANSFER_STATUS_EVENT,
        "tr-2",
        json!({ "data": { "reference": "REF-T1", "status": "reversed" } }),
    )
    .await;
    assert_eq!(p.process(id).await.unwrap(), WebhookEventStatus::Completed);

    let tx = h.store.connection_transactions(connection.id).pop().unwrap();
    assert_eq!(tx.status.as_deref(), Some("reversed"));
    assert_eq!(tx.metadata["webhook_event_id"], id);
}

#[tokio::test]
async fn unknown_transfer_reference_still_completes() {
    let h = Harness::new();
    let p = processor(&h);
    let id = record(
        &p,
        TRANSFER_STATUS_EVENT,
        "tr-3",
        json!({ "data": { "reference": "NOPE", "status": "failed" } }),
    )
    .await;
    assert_eq!(p.process(id).await.unwrap(), WebhookEventStatus::Completed);
}
