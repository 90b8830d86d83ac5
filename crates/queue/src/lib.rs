//! `queue` crate: post-commit notification outbox.
//!
//! The engine pushes a [`Notification`] only after a transition has been
//! committed. Pushing never blocks and never fails the caller; a separate
//! [`NotificationDispatcher`] task drains the channel into the configured
//! [`Notifier`]. A failed delivery is logged and dropped: it must never roll
//! back the approval that triggered it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use integrations::{DeliveryStatus, Notifier};

/// One message for the notification collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: String,
    pub template_key: String,
    /// Instance the notification is about, for log correlation.
    pub instance_id: Option<Uuid>,
    pub context: Value,
}

impl Notification {
    pub fn new(
        recipient_id: impl Into<String>,
        template_key: impl Into<String>,
        instance_id: Uuid,
        context: Value,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            template_key: template_key.into(),
            instance_id: Some(instance_id),
            context,
        }
    }
}

/// Producer half. Cheap to clone; hand one to every component that emits
/// notifications.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationQueue {
    /// Enqueue without waiting. Returns `false` if the dispatcher is gone.
    pub fn push(&self, notification: Notification) -> bool {
        match self.tx.send(notification) {
            Ok(()) => true,
            Err(mpsc::error::SendError(dropped)) => {
                warn!(
                    recipient_id = %dropped.recipient_id,
                    template_key = %dropped.template_key,
                    "notification dispatcher is not running; notification dropped"
                );
                false
            }
        }
    }
}

/// Totals for a dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Consumer half. Owns the receiver and the delivery backend.
pub struct NotificationDispatcher {
    rx: mpsc::UnboundedReceiver<Notification>,
    notifier: Arc<dyn Notifier>,
}

/// Create a connected queue / dispatcher pair.
pub fn channel(notifier: Arc<dyn Notifier>) -> (NotificationQueue, NotificationDispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationQueue { tx }, NotificationDispatcher { rx, notifier })
}

impl NotificationDispatcher {
    /// Deliver notifications until every [`NotificationQueue`] handle has been
    /// dropped, then return the totals.
    pub async fn run(mut self) -> DispatchReport {
        info!("notification dispatcher started");
        let mut report = DispatchReport::default();

        while let Some(n) = self.rx.recv().await {
            match self.notifier.notify(&n.recipient_id, &n.template_key, &n.context).await {
                DeliveryStatus::Delivered => report.delivered += 1,
                DeliveryStatus::Failed => {
                    report.failed += 1;
                    error!(
                        recipient_id = %n.recipient_id,
                        template_key = %n.template_key,
                        instance_id = ?n.instance_id,
                        "notification delivery failed"
                    );
                }
            }
        }

        info!(
            "notification dispatcher stopped ({} delivered, {} failed)",
            report.delivered, report.failed
        );
        report
    }
}
