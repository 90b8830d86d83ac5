//! In-process store backed by a single `RwLock`.
//!
//! Used by tests and by DB-less runs of the binary. Holding one write lock
//! across the guard check, the instance write and the log append gives the
//! same all-or-nothing behaviour as the Postgres transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    StoreError,
    models::{ActionKind, StepAction, WorkflowInstance, WorkflowTemplate},
    store::{TransitionGuard, WorkflowStore},
};

#[derive(Default)]
struct Inner {
    templates: HashMap<Uuid, WorkflowTemplate>,
    instances: HashMap<Uuid, WorkflowInstance>,
    actions: HashMap<Uuid, Vec<StepAction>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.templates.contains_key(&template.id) {
            return Err(StoreError::Duplicate(template.id));
        }
        inner.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, StoreError> {
        Ok(self.inner.read().await.templates.get(&id).cloned())
    }

    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.instances.contains_key(&instance.id) {
            return Err(StoreError::Duplicate(instance.id));
        }
        inner.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>, StoreError> {
        Ok(self.inner.read().await.instances.get(&id).cloned())
    }

    async fn commit(
        &self,
        guard: &TransitionGuard,
        instance: &WorkflowInstance,
        action: &StepAction,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let current = inner
            .instances
            .get(&guard.instance_id)
            .ok_or_else(|| StoreError::Corrupt(format!("instance {} vanished", guard.instance_id)))?;
        if !guard.matches(current) {
            return Err(StoreError::Conflict);
        }

        inner.instances.insert(instance.id, instance.clone());
        inner.actions.entry(instance.id).or_default().push(action.clone());
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<WorkflowInstance>, StoreError> {
        let inner = self.inner.read().await;
        let mut due: Vec<WorkflowInstance> = inner
            .instances
            .values()
            .filter(|i| !i.is_terminal())
            .filter(|i| {
                i.current_step_deadline_at.is_some_and(|d| d < now)
                    || i.auto_terminate_at.is_some_and(|d| d < now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|i| i.current_step_deadline_at);
        Ok(due)
    }

    async fn list_for_approver(&self, actor_id: &str) -> Result<Vec<WorkflowInstance>, StoreError> {
        let inner = self.inner.read().await;
        let mut inbox: Vec<WorkflowInstance> = inner
            .instances
            .values()
            .filter(|i| i.status.is_awaiting_action() && i.is_approver(actor_id))
            .cloned()
            .collect();
        inbox.sort_by_key(|i| (i.current_step_deadline_at.is_none(), i.current_step_deadline_at, i.initiated_at));
        Ok(inbox)
    }

    async fn actions_for_instance(&self, instance_id: Uuid) -> Result<Vec<StepAction>, StoreError> {
        let inner = self.inner.read().await;
        let mut actions = inner.actions.get(&instance_id).cloned().unwrap_or_default();
        actions.sort_by_key(|a| a.sequence);
        Ok(actions)
    }

    async fn has_open_action_at(
        &self,
        instance_id: Uuid,
        step_order: u32,
        kind: ActionKind,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.actions.get(&instance_id).is_some_and(|log| {
            log.iter()
                .any(|a| a.step_order == step_order && a.action == kind && a.acted_at >= since)
        }))
    }
}
