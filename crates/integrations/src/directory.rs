//! `DirectoryResolver`: an in-process approver directory loaded from config.
//!
//! Good enough for single-tenant deployments and demos; a real HRIS lookup
//! implements [`ApproverResolver`] against its own backend.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{ApproverResolver, ApproverRule, ResolutionContext, ResolveError};

/// Metadata keys consulted (in order) to find the subject's manager directly.
const MANAGER_KEYS: [&str; 2] = ["manager_id", "managerId"];
/// Metadata keys consulted (in order) to find the subject employee.
const SUBJECT_KEYS: [&str; 2] = ["employee_id", "employeeId"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryResolver {
    /// role name → user IDs holding it
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,
    /// user ID → that user's manager
    #[serde(default)]
    pub managers: HashMap<String, String>,
}

impl DirectoryResolver {
    pub fn new(roles: HashMap<String, Vec<String>>, managers: HashMap<String, String>) -> Self {
        Self { roles, managers }
    }

    fn manager_of(&self, ctx: &ResolutionContext) -> Result<String, ResolveError> {
        let lookup = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| ctx.metadata.get(*k).and_then(|v| v.as_str()))
                .map(str::to_owned)
        };

        if let Some(manager) = lookup(&MANAGER_KEYS) {
            return Ok(manager);
        }

        let subject = lookup(&SUBJECT_KEYS).unwrap_or_else(|| ctx.initiator_id.clone());
        self.managers
            .get(&subject)
            .cloned()
            .ok_or(ResolveError::NoManager(subject))
    }
}

#[async_trait]
impl ApproverResolver for DirectoryResolver {
    async fn resolve(
        &self,
        rule: &ApproverRule,
        ctx: &ResolutionContext,
    ) -> Result<Vec<String>, ResolveError> {
        let approvers = match rule {
            ApproverRule::User { user_id } => vec![user_id.clone()],
            ApproverRule::Role { role } => self
                .roles
                .get(role)
                .cloned()
                .ok_or_else(|| ResolveError::UnknownRole(role.clone()))?,
            ApproverRule::ManagerOfSubject => vec![self.manager_of(ctx)?],
        };

        debug!(
            instance_id = %ctx.instance_id,
            step_order = ctx.step_order,
            "resolved approvers {:?}",
            approvers
        );
        Ok(approvers)
    }
}
