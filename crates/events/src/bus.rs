//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the engine, which
//! publishes, and the notification router, which subscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use ledgerlink_core::status::ConnectionStatus;
use ledgerlink_core::types::DbId;

pub const CONNECTION_STATUS_CHANGED: &str = "connection.status_changed";
pub const CONNECTION_SYNCED: &str = "connection.synced";
pub const CREDIT_SCORE_CALCULATED: &str = "credit_score.calculated";

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// Something that happened to a user's banking data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Dot-separated event name, e.g. `"connection.synced"`.
    pub event_type: String,

    pub user_id: DbId,

    /// Set for connection events.
    pub connection_id: Option<DbId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<String>, user_id: DbId) -> Self {
        Self {
            event_type: event_type.into(),
            user_id,
            connection_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_connection(mut self, connection_id: DbId) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn connection_status_changed(
        user_id: DbId,
        connection_id: DbId,
        from: ConnectionStatus,
        to: ConnectionStatus,
        reason: Option<&str>,
    ) -> Self {
        Self::new(CONNECTION_STATUS_CHANGED, user_id)
            .with_connection(connection_id)
            .with_payload(serde_json::json!({
                "from": from.as_str(),
                "to": to.as_str(),
                "reason": reason,
            }))
    }

    pub fn connection_synced(
        user_id: DbId,
        connection_id: DbId,
        transactions_inserted: u64,
        accounts_failed: usize,
    ) -> Self {
        Self::new(CONNECTION_SYNCED, user_id)
            .with_connection(connection_id)
            .with_payload(serde_json::json!({
                "transactions_inserted": transactions_inserted,
                "accounts_failed": accounts_failed,
            }))
    }

    pub fn credit_score_calculated(user_id: DbId, score: i32, grade: &str, risk_level: &str) -> Self {
        Self::new(CREDIT_SCORE_CALCULATED, user_id).with_payload(serde_json::json!({
            "score": score,
            "grade": grade,
            "risk_level": risk_level,
        }))
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use ledgerlink_events::bus::{DomainEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(DomainEvent::new("connection.synced", 1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// When the buffer is full the oldest unread events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped silently when nobody
    /// listens.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
