//! User notifications derived from domain events.
//!
//! [`NotificationRouter`] subscribes to the [`EventBus`](crate::bus::EventBus),
//! picks the events a user should hear about and hands them to a
//! [`Notifier`]. Email and SMS delivery live behind that trait; this crate
//! ships only [`LogNotifier`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use ledgerlink_core::types::DbId;

use crate::bus::{DomainEvent, CONNECTION_STATUS_CHANGED, CREDIT_SCORE_CALCULATED};

/// A message addressed to one user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub user_id: DbId,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery channel for user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = notification.user_id,
            subject = %notification.subject,
            "User notification",
        );
        Ok(())
    }
}

/// Build the notification for `event`, if users are told about it.
///
/// Routine syncs stay silent; only connections that stopped working and new
/// credit scores are announced.
pub fn notification_for(event: &DomainEvent) -> Option<Notification> {
    let (subject, body) = match event.event_type.as_str() {
        CONNECTION_STATUS_CHANGED => match event.payload["to"].as_str()? {
            "expired" => (
                "Your bank connection has expired",
                "Your banking connection has expired. Please reconnect your account.".to_string(),
            ),
            "revoked" => (
                "Your bank connection was revoked",
                "Access to your bank account was withdrawn. Reconnect to keep your profile up to date."
                    .to_string(),
            ),
            "active" => (
                "Your bank account is connected",
                "Your bank account is connected and your transactions are being imported."
                    .to_string(),
            ),
            _ => return None,
        },
        CREDIT_SCORE_CALCULATED => {
            let score = event.payload["score"].as_i64()?;
            let grade = event.payload["grade"].as_str().unwrap_or("-");
            (
                "Your credit score is ready",
                format!("Your new credit score is {score} (grade {grade})."),
            )
        }
        _ => return None,
    };
    Some(Notification {
        user_id: event.user_id,
        subject: subject.to_string(),
        body,
    })
}

/// Background service forwarding events to a [`Notifier`].
pub struct NotificationRouter;

impl NotificationRouter {
    /// Run until the bus is dropped.
    pub async fn run(notifier: Arc<dyn Notifier>, mut receiver: broadcast::Receiver<DomainEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let Some(notification) = notification_for(&event) else {
                        continue;
                    };
                    if let Err(e) = notifier.notify(&notification).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            user_id = event.user_id,
                            "Failed to deliver notification",
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification router lagged, some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification router shutting down");
                    break;
                }
            }
        }
    }
}
