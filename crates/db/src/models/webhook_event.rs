//! Inbound webhook event models.

use ledgerlink_core::status::{StatusId, WebhookEventStatus};
use ledgerlink_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `webhook_events` table.
///
/// `(event_type, event_id)` is unique, which makes duplicate deliveries
/// collapse at insert time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEvent {
    pub id: DbId,
    pub event_type: String,
    pub event_id: String,
    pub payload: serde_json::Value,
    pub status_id: StatusId,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub processed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WebhookEvent {
    pub fn status(&self) -> WebhookEventStatus {
        WebhookEventStatus::from_id(self.status_id).unwrap_or(WebhookEventStatus::Failed)
    }
}

/// DTO for recording a verified delivery.
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_type: String,
    pub event_id: String,
    pub payload: serde_json::Value,
}
