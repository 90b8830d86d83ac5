//! Workflow instance store. The only component that mutates shared state.
//!
//! All transitions go through [`WorkflowStore::commit`], which applies the
//! new instance state and appends its action atomically, guarded by the
//! `(status, current_step_order, revision)` the writer read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    StoreError,
    models::{ActionKind, InstanceStatus, StepAction, WorkflowInstance, WorkflowTemplate},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Optimistic-concurrency guard captured when an instance is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionGuard {
    pub instance_id: Uuid,
    pub status: InstanceStatus,
    pub current_step_order: u32,
    pub revision: u64,
}

impl TransitionGuard {
    pub fn of(instance: &WorkflowInstance) -> Self {
        Self {
            instance_id: instance.id,
            status: instance.status,
            current_step_order: instance.current_step_order,
            revision: instance.revision,
        }
    }

    pub fn matches(&self, instance: &WorkflowInstance) -> bool {
        *self == Self::of(instance)
    }
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // ---- templates ------------------------------------------------------

    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<(), StoreError>;

    async fn get_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, StoreError>;

    // ---- instances ------------------------------------------------------

    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    async fn get_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>, StoreError>;

    /// Atomically replace the instance and append `action`.
    ///
    /// Returns [`StoreError::Conflict`] without writing anything if the stored
    /// instance no longer matches `guard`.
    async fn commit(
        &self,
        guard: &TransitionGuard,
        instance: &WorkflowInstance,
        action: &StepAction,
    ) -> Result<(), StoreError>;

    /// Non-terminal instances whose step deadline or hard stop is before `now`.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<WorkflowInstance>, StoreError>;

    /// Non-draft, non-terminal instances where `actor_id` is a current approver.
    async fn list_for_approver(&self, actor_id: &str) -> Result<Vec<WorkflowInstance>, StoreError>;

    // ---- action log -----------------------------------------------------

    /// Every action for the instance, ordered by `acted_at`.
    async fn actions_for_instance(&self, instance_id: Uuid) -> Result<Vec<StepAction>, StoreError>;

    /// Whether an action of `kind` was logged against `step_order` at or after
    /// `since` (the start of the current visit to that step).
    async fn has_open_action_at(
        &self,
        instance_id: Uuid,
        step_order: u32,
        kind: ActionKind,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
