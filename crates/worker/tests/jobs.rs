mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use ledgerlink_core::status::ConnectionStatus;
use ledgerlink_db::store::Store;
use ledgerlink_engine::webhook::CONSENT_STATUS_EVENT;
use ledgerlink_engine::{Recorded, WebhookProcessor};
use ledgerlink_worker::jobs::cleanup::{self, CleanupSummary};
use ledgerlink_worker::jobs::sync_sweep::{SweepSummary, SyncScheduler};
use ledgerlink_worker::jobs::{consent_expiry, token_refresh, webhook_retry};

use common::{Harness, SteadyProvider};

#[tokio::test]
async fn sweep_syncs_every_active_connection() {
    let h = Harness::new(SteadyProvider::default());
    let first = h.active("1111111111").await;
    let second = h.active("2222222222").await;
    let pending = h.pending("3333333333").await;

    let scheduler = SyncScheduler::new(h.ctx.clone(), 4, CancellationToken::new());
    let summary = scheduler.sweep().await.unwrap();
    assert_eq!(
        summary,
        SweepSummary {
            connections: 2,
            synced: 2,
            failed: 0,
            transactions_inserted: 4,
        }
    );

    assert_eq!(h.store.connection_transactions(first.id).len(), 2);
    assert_eq!(h.store.connection_transactions(second.id).len(), 2);
    assert!(h.store.connection_transactions(pending.id).is_empty());
}

#[tokio::test]
async fn sweep_respects_the_concurrency_limit() {
    let h = Harness::new(SteadyProvider {
        accounts_delay: Duration::from_millis(20),
        ..SteadyProvider::default()
    });
    for account in ["1111111111", "2222222222", "3333333333", "4444444444"] {
        h.active(account).await;
    }

    let scheduler = SyncScheduler::new(h.ctx.clone(), 2, CancellationToken::new());
    let summary = scheduler.sweep().await.unwrap();
    assert_eq!(summary.synced, 4);
    assert!(h.provider.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn cancelled_scheduler_starts_nothing() {
    let h = Harness::new(SteadyProvider::default());
    let connection = h.active("1111111111").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = SyncScheduler::new(h.ctx.clone(), 4, cancel)
        .sweep()
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert!(h.store.connection_transactions(connection.id).is_empty());
}

#[tokio::test]
async fn refreshed_connections_get_a_sync() {
    let h = Harness::new(SteadyProvider::default());
    let connection = h.active("1111111111").await;
    let now = Utc::now();
    h.store.update_connection(connection.id, |c| {
        c.token_expires_at = Some(now + chrono::Duration::minutes(5));
        c.last_synced_at = Some(now - chrono::Duration::hours(3));
    });

    let scheduler = SyncScheduler::new(h.ctx.clone(), 4, CancellationToken::new());
    let refreshed = token_refresh::run_once(&h.lifecycle, &scheduler).await;
    assert_eq!(refreshed, 1);
    assert_eq!(h.provider.refreshes.load(Ordering::SeqCst), 1);

    scheduler.tasks().close();
    scheduler.tasks().wait().await;
    assert_eq!(h.store.connection_transactions(connection.id).len(), 2);
}

#[tokio::test]
async fn lapsed_consent_is_expired() {
    let h = Harness::new(SteadyProvider::default());
    let connection = h.active("1111111111").await;
    h.store.update_connection(connection.id, |c| {
        c.consent_expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
    });

    consent_expiry::run_once(&h.lifecycle).await;
    assert_eq!(
        h.lifecycle.load(connection.id).await.unwrap().status(),
        ConnectionStatus::Expired
    );
}

#[tokio::test]
async fn failed_webhooks_are_retried() {
    let h = Harness::new(SteadyProvider::default());
    let processor = WebhookProcessor::new(h.lifecycle.clone());
    let payload = json!({ "data": { "consent_id": "late", "consent_status": "revoked" } });
    let id = match processor
        .record(CONSENT_STATUS_EVENT, Some("evt-1"), None, payload)
        .await
        .unwrap()
    {
        Recorded::New(event) => event.id,
        Recorded::Duplicate => panic!("expected a new event"),
    };
    // No connection carries the consent yet, so the first attempt fails.
    processor.process(id).await.unwrap();

    let connection = h.active("1111111111").await;
    h.store
        .update_connection(connection.id, |c| c.consent_id = Some("late".into()));

    webhook_retry::run_once(&processor).await;
    assert_eq!(
        h.lifecycle.load(connection.id).await.unwrap().status(),
        ConnectionStatus::Revoked
    );
}

#[tokio::test]
async fn cleanup_drops_old_events_and_dead_connections() {
    let h = Harness::new(SteadyProvider::default());
    let dead = h.active("1111111111").await;
    let live = h.active("2222222222").await;
    h.lifecycle.revoke(dead.id).await.unwrap();
    h.store.update_connection(dead.id, |c| {
        c.updated_at = Utc::now() - chrono::Duration::days(120);
    });

    let processor = WebhookProcessor::new(h.lifecycle.clone());
    for (event_id, age_days) in [("old", 45), ("recent", 2)] {
        if let Recorded::New(event) = processor
            .record(CONSENT_STATUS_EVENT, Some(event_id), None, json!({}))
            .await
            .unwrap()
        {
            h.store.update_webhook_event(event.id, |e| {
                e.created_at = Utc::now() - chrono::Duration::days(age_days);
            });
        }
    }

    let summary = cleanup::run_once(h.store.as_ref(), Utc::now()).await;
    assert_eq!(
        summary,
        CleanupSummary {
            webhook_events_deleted: 1,
            balances_pruned: 0,
            connections_deleted: 1,
        }
    );
    assert_eq!(h.store.webhook_events().len(), 1);
    assert!(h.store.find_connection(dead.id).await.unwrap().is_none());
    assert!(h.store.find_connection(live.id).await.unwrap().is_some());
}
