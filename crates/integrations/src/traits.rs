//! Collaborator traits shared by the engine and every concrete integration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ResolveError;

/// Who is allowed to act on a step.
///
/// Defined here (in the integrations crate) so both the engine and resolver
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApproverRule {
    /// Anyone holding the named role.
    Role { role: String },
    /// One specific user.
    User { user_id: String },
    /// The line manager of the person the subject record is about.
    ManagerOfSubject,
}

/// Everything a resolver may look at when a step is entered.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub instance_id: Uuid,
    /// Subject type tag (leave, appraisal, …).
    pub category: String,
    /// Company whose authority the step executes under.
    pub acting_company_id: String,
    pub initiator_id: String,
    pub step_order: u32,
    /// Opaque subject metadata, passed through untouched by the engine.
    pub metadata: Value,
}

/// Outcome of a single notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// Notification delivery contract.
///
/// Implementations must not panic; a failed delivery is reported as
/// [`DeliveryStatus::Failed`] and logged by the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient_id: &str, template_key: &str, context: &Value) -> DeliveryStatus;
}

/// Resolves an [`ApproverRule`] to the user IDs who may act on a step.
///
/// An empty list means "anyone may act"; the engine then skips the
/// assignee check for that step.
#[async_trait]
pub trait ApproverResolver: Send + Sync {
    async fn resolve(
        &self,
        rule: &ApproverRule,
        ctx: &ResolutionContext,
    ) -> Result<Vec<String>, ResolveError>;
}
