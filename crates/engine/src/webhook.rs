//! Provider webhook intake.
//!
//! A delivery is verified against the client credentials, stored once per
//! `(event_type, event_id)` and then processed. Processing is idempotent:
//! a retried event re-applies its effect and finds nothing left to change.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use ledgerlink_core::connection_state::ConnectionEvent;
use ledgerlink_core::signing::verify_signature;
use ledgerlink_core::status::{ConnectionStatus, WebhookEventStatus};
use ledgerlink_core::types::{DbId, Timestamp};
use ledgerlink_db::models::bank_connection::BankConnection;
use ledgerlink_db::models::webhook_event::{NewWebhookEvent, WebhookEvent};
use ledgerlink_db::store::StoreError;

use crate::context::EngineContext;
use crate::lifecycle::{ConnectionLifecycle, LifecycleError, PollOutcome};
use crate::payments::parse_provider_status;

pub const CONSENT_STATUS_EVENT: &str = "consent_status";
pub const TRANSFER_STATUS_EVENT: &str = "transfer_status";

/// Failed events older than this are left alone by the retry sweep.
pub const RETRY_MAX_AGE_HOURS: i64 = 24;
pub const RETRY_BATCH_LIMIT: i64 = 50;
pub const RETRY_MAX_ATTEMPTS: i32 = 5;
/// Pending or processing events untouched this long are treated as
/// abandoned and picked up again.
pub const STALE_AFTER_MINUTES: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    #[error("Webhook signature mismatch")]
    InvalidSignature,

    #[error("Unsupported webhook event type: {0}")]
    UnsupportedEvent(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Webhook event {0} not found")]
    EventNotFound(DbId),

    #[error("No connection matches the consent event")]
    UnknownConnection,

    #[error("Consent approved but no token issued yet for connection {0}")]
    TokenNotIssued(DbId),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The headers that authenticate a delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookHeaders<'a> {
    pub idempotency_key: Option<&'a str>,
    /// Raw `Authorization` header value, `Bearer <token>` or `Bearer `.
    pub authorization: Option<&'a str>,
    pub signature: Option<&'a str>,
}

impl WebhookHeaders<'_> {
    /// The token segment of the signed material. A present header with an
    /// empty value or empty Bearer token signs an empty segment; only an
    /// absent header, or a scheme other than Bearer, leaves it out.
    fn bearer_token(&self) -> Option<&str> {
        let value = self.authorization?.trim_start();
        if value.is_empty() || value == "Bearer" {
            return Some("");
        }
        value.strip_prefix("Bearer ").map(str::trim)
    }
}

/// Outcome of recording a delivery.
#[derive(Debug)]
pub enum Recorded {
    New(WebhookEvent),
    /// The same event was delivered before; nothing was stored.
    Duplicate,
}

/// Totals from one retry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ConsentStatusData {
    #[serde(default)]
    consent_id: Option<String>,
    #[serde(default)]
    device_code: Option<String>,
    consent_status: String,
}

#[derive(Debug, Deserialize)]
struct TransferStatusData {
    reference: String,
    status: String,
    #[serde(default)]
    status_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsentDecision {
    Approved,
    Revoked,
    Expired,
}

impl ConsentDecision {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" | "authorized" | "authorised" => Some(Self::Approved),
            "revoked" | "rejected" => Some(Self::Revoked),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

fn stale_after() -> chrono::Duration {
    chrono::Duration::minutes(STALE_AFTER_MINUTES)
}

fn parse_data<T: for<'de> Deserialize<'de>>(payload: &serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value::<Envelope<T>>(payload.clone())
        .map(|e| e.data)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

#[derive(Clone)]
pub struct WebhookProcessor {
    lifecycle: ConnectionLifecycle,
}

impl WebhookProcessor {
    pub fn new(lifecycle: ConnectionLifecycle) -> Self {
        Self { lifecycle }
    }

    fn ctx(&self) -> &EngineContext {
        self.lifecycle.context()
    }

    /// Check the delivery's signature. Nothing is stored on failure.
    pub fn verify(&self, headers: &WebhookHeaders<'_>) -> Result<(), WebhookError> {
        let key = headers
            .idempotency_key
            .filter(|k| !k.is_empty())
            .ok_or(WebhookError::MissingHeader("idempotency_key"))?;
        let signature = headers
            .signature
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::MissingHeader("signature"))?;

        if verify_signature(
            &self.ctx().credentials.client_secret,
            key,
            headers.bearer_token(),
            signature,
        ) {
            Ok(())
        } else {
            tracing::warn!("Webhook signature mismatch");
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Store a verified delivery. The event id falls back to the
    /// idempotency key, then to a fresh UUID.
    pub async fn record(
        &self,
        event_type: &str,
        event_id: Option<&str>,
        idempotency_key: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<Recorded, WebhookError> {
        if event_type != CONSENT_STATUS_EVENT && event_type != TRANSFER_STATUS_EVENT {
            return Err(WebhookError::UnsupportedEvent(event_type.to_string()));
        }
        let event_id = event_id
            .or(idempotency_key)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let input = NewWebhookEvent {
            event_type: event_type.to_string(),
            event_id,
            payload,
        };
        match self.ctx().store.insert_webhook_event(&input).await? {
            Some(event) => {
                tracing::info!(
                    webhook_event_id = event.id,
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    "Webhook event recorded",
                );
                Ok(Recorded::New(event))
            }
            None => {
                tracing::info!(event_type, event_id = %input.event_id, "Duplicate webhook delivery ignored");
                Ok(Recorded::Duplicate)
            }
        }
    }

    /// Apply a stored event's effect and record the outcome. Events already
    /// processing or completed are left as they are.
    pub async fn process(&self, id: DbId) -> Result<WebhookEventStatus, WebhookError> {
        self.process_claiming(id, Utc::now() - stale_after()).await
    }

    async fn process_claiming(
        &self,
        id: DbId,
        stale_before: Timestamp,
    ) -> Result<WebhookEventStatus, WebhookError> {
        let store = &self.ctx().store;
        let Some(event) = store.claim_webhook_event(id, stale_before).await? else {
            let existing = store
                .find_webhook_event(id)
                .await?
                .ok_or(WebhookError::EventNotFound(id))?;
            tracing::debug!(webhook_event_id = id, status = %existing.status(), "Webhook event not claimable");
            return Ok(existing.status());
        };

        match self.apply(&event).await {
            Ok(()) => {
                store
                    .finish_webhook_event(id, WebhookEventStatus::Completed, None)
                    .await?;
                tracing::info!(webhook_event_id = id, event_type = %event.event_type, "Webhook event processed");
                Ok(WebhookEventStatus::Completed)
            }
            Err(e) => {
                let reason = e.to_string();
                store
                    .finish_webhook_event(id, WebhookEventStatus::Failed, Some(&reason))
                    .await?;
                tracing::warn!(
                    webhook_event_id = id,
                    event_type = %event.event_type,
                    attempts = event.attempts,
                    error = %reason,
                    "Webhook event failed",
                );
                Ok(WebhookEventStatus::Failed)
            }
        }
    }

    /// Re-run events created after `now - 24h` that failed, or that sat
    /// pending or processing for [`STALE_AFTER_MINUTES`] without finishing.
    /// At most 50 per sweep and 5 attempts per event. Signatures were
    /// checked on receipt.
    pub async fn retry_failed(&self, now: Timestamp) -> Result<RetrySummary, WebhookError> {
        let stale_before = now - stale_after();
        let events = self
            .ctx()
            .store
            .list_retryable_webhook_events(
                now - chrono::Duration::hours(RETRY_MAX_AGE_HOURS),
                stale_before,
                RETRY_MAX_ATTEMPTS,
                RETRY_BATCH_LIMIT,
            )
            .await?;

        let mut summary = RetrySummary::default();
        for event in events {
            summary.attempted += 1;
            match self.process_claiming(event.id, stale_before).await {
                Ok(WebhookEventStatus::Completed) => summary.completed += 1,
                Ok(_) => summary.failed += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(webhook_event_id = event.id, error = %e, "Webhook retry failed");
                }
            }
        }
        if summary.attempted > 0 {
            tracing::info!(
                attempted = summary.attempted,
                completed = summary.completed,
                failed = summary.failed,
                "Webhook retry sweep finished",
            );
        }
        Ok(summary)
    }

    async fn apply(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        match event.event_type.as_str() {
            CONSENT_STATUS_EVENT => self.apply_consent(parse_data(&event.payload)?).await,
            TRANSFER_STATUS_EVENT => self.apply_transfer(event.id, parse_data(&event.payload)?).await,
            other => Err(WebhookError::UnsupportedEvent(other.to_string())),
        }
    }

    async fn find_consent_connection(
        &self,
        data: &ConsentStatusData,
    ) -> Result<Option<BankConnection>, StoreError> {
        let store = &self.ctx().store;
        if let Some(consent_id) = data.consent_id.as_deref().filter(|c| !c.is_empty()) {
            if let Some(connection) = store.find_connection_by_consent_id(consent_id).await? {
                return Ok(Some(connection));
            }
        }
        match data.device_code.as_deref().filter(|c| !c.is_empty()) {
            Some(device_code) => store.find_connection_by_device_code(device_code).await,
            None => Ok(None),
        }
    }

    async fn apply_consent(&self, data: ConsentStatusData) -> Result<(), WebhookError> {
        let decision = ConsentDecision::parse(&data.consent_status).ok_or_else(|| {
            WebhookError::InvalidPayload(format!("unknown consent_status '{}'", data.consent_status))
        })?;

        // A consent event can arrive before the grant stored its consent id;
        // failing keeps it eligible for the retry sweep.
        let connection = self
            .find_consent_connection(&data)
            .await?
            .ok_or(WebhookError::UnknownConnection)?;
        let id = connection.id;
        let status = connection.status();

        match decision {
            ConsentDecision::Approved => match status {
                ConnectionStatus::Active => Ok(()),
                ConnectionStatus::Pending if connection.encrypted_access_token.is_none() => {
                    // Exchange the device code now instead of waiting for the
                    // client's next poll.
                    match self.lifecycle.poll(id, None).await? {
                        PollOutcome::Active(_) => Ok(()),
                        PollOutcome::Pending { .. } | PollOutcome::SlowDown { .. } => {
                            Err(WebhookError::TokenNotIssued(id))
                        }
                    }
                }
                ConnectionStatus::Pending | ConnectionStatus::Expired | ConnectionStatus::Error => {
                    self.apply_locked(id, ConnectionEvent::TokenGranted, "Consent approved")
                        .await
                }
                ConnectionStatus::Revoked => {
                    tracing::warn!(connection_id = id, "Approval for a revoked connection ignored");
                    Ok(())
                }
            },
            ConsentDecision::Revoked => {
                self.apply_locked(id, ConnectionEvent::Revoked, "Consent revoked")
                    .await
            }
            ConsentDecision::Expired => {
                self.apply_locked(id, ConnectionEvent::Lapsed, "Consent expired")
                    .await
            }
        }
    }

    /// Apply a status event under the connection lock, re-reading the
    /// connection so a concurrent change is not overwritten. Already being
    /// in the target status, or a move the state machine forbids, changes
    /// nothing.
    async fn apply_locked(
        &self,
        id: DbId,
        event: ConnectionEvent,
        reason: &str,
    ) -> Result<(), WebhookError> {
        let _guard = self.ctx().locks.acquire(id).await;
        let connection = self.lifecycle.load(id).await?;
        let status = connection.status();
        match status.transition(event) {
            Ok(next) if next == status => Ok(()),
            Ok(_) => {
                self.lifecycle.apply(&connection, event, Some(reason)).await?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(connection_id = id, error = %e, "Consent event ignored");
                Ok(())
            }
        }
    }

    async fn apply_transfer(
        &self,
        webhook_event_id: DbId,
        data: TransferStatusData,
    ) -> Result<(), WebhookError> {
        let store = &self.ctx().store;
        let metadata = serde_json::json!({
            "status_message": data.status_message,
            "webhook_event_id": webhook_event_id,
            "status_updated_at": Utc::now(),
        });
        if store
            .update_transaction_status_by_reference(&data.reference, &data.status, &metadata)
            .await?
        {
            tracing::info!(reference = %data.reference, status = %data.status, "Transaction status updated");
            return Ok(());
        }

        let status = parse_provider_status(&data.status).ok_or_else(|| {
            WebhookError::InvalidPayload(format!("unknown transfer status '{}'", data.status))
        })?;
        if store
            .update_bill_payment_status_by_reference(
                &data.reference,
                status,
                data.status_message.as_deref(),
            )
            .await?
        {
            tracing::info!(reference = %data.reference, status = %status, "Bill payment status updated");
        } else {
            tracing::warn!(reference = %data.reference, "Transfer status for unknown reference");
        }
        Ok(())
    }
}
