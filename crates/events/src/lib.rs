//! Ledgerlink domain events.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`DomainEvent`]: the event envelope published by the engine.
//! - [`notifications`]: turns user-facing events into messages for the
//!   notification collaborator.

pub mod bus;
pub mod notifications;

pub use bus::{DomainEvent, EventBus};
pub use notifications::{LogNotifier, Notification, NotificationRouter, Notifier};
