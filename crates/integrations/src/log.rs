//! `LogNotifier`: writes every notification to the tracing log.
//!
//! The default notifier when no delivery backend is configured.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::{DeliveryStatus, Notifier};

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient_id: &str, template_key: &str, context: &Value) -> DeliveryStatus {
        info!(recipient_id, template_key, %context, "notification");
        DeliveryStatus::Delivered
    }
}
