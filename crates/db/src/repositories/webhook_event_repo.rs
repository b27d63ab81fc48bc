//! Repository for the `webhook_events` table.

use ledgerlink_core::status::{StatusId, WebhookEventStatus};
use ledgerlink_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::webhook_event::{NewWebhookEvent, WebhookEvent};

const COLUMNS: &str = "\
    id, event_type, event_id, payload, status_id, error_message, attempts, \
    processed_at, created_at, updated_at";

pub struct WebhookEventRepo;

impl WebhookEventRepo {
    /// Insert an event. Returns `None` if `(event_type, event_id)` exists.
    pub async fn insert(
        pool: &PgPool,
        input: &NewWebhookEvent,
    ) -> Result<Option<WebhookEvent>, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_events (event_type, event_id, payload, status_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (event_type, event_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WebhookEvent>(&query)
            .bind(&input.event_type)
            .bind(&input.event_id)
            .bind(&input.payload)
            .bind(WebhookEventStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<WebhookEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM webhook_events WHERE id = $1");
        sqlx::query_as::<_, WebhookEvent>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a pending or failed event to processing and count the attempt.
    /// A processing event last touched before `stale_before` is taken over.
    pub async fn claim(
        pool: &PgPool,
        id: DbId,
        stale_before: Timestamp,
    ) -> Result<Option<WebhookEvent>, sqlx::Error> {
        let query = format!(
            "UPDATE webhook_events SET status_id = $2, attempts = attempts + 1, updated_at = NOW() \
             WHERE id = $1 \
               AND (status_id IN ($3, $4) OR (status_id = $2 AND updated_at < $5)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WebhookEvent>(&query)
            .bind(id)
            .bind(WebhookEventStatus::Processing.id())
            .bind(WebhookEventStatus::Pending.id())
            .bind(WebhookEventStatus::Failed.id())
            .bind(stale_before)
            .fetch_optional(pool)
            .await
    }

    pub async fn finish(
        pool: &PgPool,
        id: DbId,
        status_id: StatusId,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE webhook_events SET \
                 status_id = $2, error_message = $3, \
                 processed_at = CASE WHEN $2 = $4 THEN NOW() ELSE processed_at END, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status_id)
        .bind(error_message)
        .bind(WebhookEventStatus::Completed.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Events created after `created_after` with fewer than `max_attempts`
    /// attempts that are failed, or pending/processing and untouched since
    /// `stale_before`. Oldest first.
    pub async fn list_retryable(
        pool: &PgPool,
        created_after: Timestamp,
        stale_before: Timestamp,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM webhook_events \
             WHERE created_at > $4 AND attempts < $5 \
               AND (status_id = $1 OR (status_id IN ($2, $3) AND updated_at < $6)) \
             ORDER BY created_at ASC LIMIT $7"
        );
        sqlx::query_as::<_, WebhookEvent>(&query)
            .bind(WebhookEventStatus::Failed.id())
            .bind(WebhookEventStatus::Pending.id())
            .bind(WebhookEventStatus::Processing.id())
            .bind(created_after)
            .bind(max_attempts)
            .bind(stale_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn delete_before(pool: &PgPool, before: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE created_at < $1")
            .bind(before)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
