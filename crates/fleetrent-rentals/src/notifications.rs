//! Lifecycle events handed to an out-of-band notification channel.
//!
//! Sinks are called after the transition has committed and must return
//! immediately; a sink failure is logged by the caller and never undoes the
//! transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::NotificationConfig;
use crate::domain::types::{RentalId, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BookingConfirmed,
    RentalCompleted,
    RentalCancelled,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BookingConfirmed => "booking_confirmed",
            EventKind::RentalCompleted => "rental_completed",
            EventKind::RentalCancelled => "rental_cancelled",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalEvent {
    pub kind: EventKind,
    pub tenant: TenantId,
    pub rental_id: RentalId,
    pub user_id: UserId,
    /// Where the user is reached.
    pub contact_email: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification queue is closed")]
    QueueClosed,

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &RentalEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, event: &RentalEvent) -> Result<(), NotifyError> {
        info!(
            kind = %event.kind,
            tenant = %event.tenant,
            rental_id = %event.rental_id,
            user_id = %event.user_id,
            contact = %event.contact_email,
            "Rental notification"
        );
        Ok(())
    }
}

#[async_trait]
impl NotificationDelivery for LogNotificationSink {
    async fn deliver(&self, event: RentalEvent) -> Result<(), NotifyError> {
        self.notify(&event)
    }
}

/// Hands events to a bounded queue drained by [`run_dispatch_loop`].
#[derive(Debug, Clone)]
pub struct QueueNotificationSink {
    sender: mpsc::Sender<RentalEvent>,
}

impl QueueNotificationSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RentalEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn from_config(config: &NotificationConfig) -> (Self, mpsc::Receiver<RentalEvent>) {
        Self::new(config.queue_capacity)
    }
}

impl NotificationSink for QueueNotificationSink {
    fn notify(&self, event: &RentalEvent) -> Result<(), NotifyError> {
        self.sender.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::QueueClosed,
        })
    }
}

/// Final delivery of a queued event (mail, SMS, webhook).
#[async_trait]
pub trait NotificationDelivery: Send + Sync {
    async fn deliver(&self, event: RentalEvent) -> Result<(), NotifyError>;
}

/// Drain `receiver` until every sender is dropped.
pub async fn run_dispatch_loop(
    mut receiver: mpsc::Receiver<RentalEvent>,
    delivery: Arc<dyn NotificationDelivery>,
) {
    info!("Starting notification dispatch loop");

    while let Some(event) = receiver.recv().await {
        let rental_id = event.rental_id;
        let kind = event.kind;
        if let Err(e) = delivery.deliver(event).await {
            error!(%rental_id, %kind, "Failed to deliver notification: {}", e);
        }
    }

    info!("Notification dispatch loop stopped");
}
