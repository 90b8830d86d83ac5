//! Test doubles for the collaborator traits.
//!
//! Useful in unit and integration tests where a real directory or delivery
//! channel is either unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{ApproverResolver, ApproverRule, DeliveryStatus, Notifier, ResolutionContext, ResolveError};

/// A single call seen by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub recipient_id: String,
    pub template_key: String,
    pub context: Value,
}

/// A notifier that records every call it receives and reports a fixed outcome.
#[derive(Clone)]
pub struct RecordingNotifier {
    outcome: DeliveryStatus,
    /// All notifications seen (in call order).
    pub sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl RecordingNotifier {
    /// A notifier whose deliveries always succeed.
    pub fn delivering() -> Self {
        Self { outcome: DeliveryStatus::Delivered, sent: Arc::new(Mutex::new(Vec::new())) }
    }

    /// A notifier whose deliveries always fail.
    pub fn failing() -> Self {
        Self { outcome: DeliveryStatus::Failed, sent: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// Template keys received, in call order.
    pub fn keys(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.template_key).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient_id: &str, template_key: &str, context: &Value) -> DeliveryStatus {
        self.sent.lock().unwrap().push(SentNotification {
            recipient_id: recipient_id.to_owned(),
            template_key: template_key.to_owned(),
            context: context.clone(),
        });
        self.outcome
    }
}

/// A resolver with a fixed answer per role; `User` rules resolve to the user
/// and `ManagerOfSubject` resolves to the configured manager (if any).
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    pub roles: HashMap<String, Vec<String>>,
    pub manager: Option<String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<String>, users: &[&str]) -> Self {
        self.roles
            .insert(role.into(), users.iter().map(|u| u.to_string()).collect());
        self
    }

    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        self.manager = Some(manager.into());
        self
    }
}

#[async_trait]
impl ApproverResolver for StaticResolver {
    async fn resolve(
        &self,
        rule: &ApproverRule,
        ctx: &ResolutionContext,
    ) -> Result<Vec<String>, ResolveError> {
        match rule {
            ApproverRule::User { user_id } => Ok(vec![user_id.clone()]),
            ApproverRule::Role { role } => self
                .roles
                .get(role)
                .cloned()
                .ok_or_else(|| ResolveError::UnknownRole(role.clone())),
            ApproverRule::ManagerOfSubject => self
                .manager
                .clone()
                .map(|m| vec![m])
                .ok_or_else(|| ResolveError::NoManager(ctx.initiator_id.clone())),
        }
    }
}
