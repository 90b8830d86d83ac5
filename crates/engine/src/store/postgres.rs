//! Postgres-backed store built on the `db` repository functions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::{
    DbError, DbPool,
    models::{GuardRow, InstanceRow, StepActionRow, TemplateRow},
    repository::{actions, instances, templates},
};
use uuid::Uuid;

use crate::{
    StoreError,
    models::{ActionKind, StepAction, WorkflowInstance, WorkflowTemplate},
    store::{TransitionGuard, WorkflowStore},
};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_i32(value: u32, field: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {value}")))
}

fn to_u32(value: i32, field: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} is negative: {value}")))
}

fn to_i64(value: u64, field: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {value}")))
}

fn to_u64(value: i64, field: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} is negative: {value}")))
}

/// `NotFound` from a by-id lookup becomes `None`.
fn optional<T>(result: Result<T, DbError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(row) => Ok(Some(row)),
        Err(DbError::NotFound) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

// ---------------------------------------------------------------------------
// Row conversions
// ---------------------------------------------------------------------------

fn template_to_row(template: &WorkflowTemplate) -> Result<TemplateRow, StoreError> {
    Ok(TemplateRow {
        id: template.id,
        name: template.name.clone(),
        definition: serde_json::to_value(template)?,
        created_at: template.created_at,
    })
}

fn template_from_row(row: TemplateRow) -> Result<WorkflowTemplate, StoreError> {
    let mut template: WorkflowTemplate = serde_json::from_value(row.definition)?;
    template.id = row.id;
    template.name = row.name;
    template.created_at = row.created_at;
    Ok(template)
}

fn instance_to_row(instance: &WorkflowInstance) -> Result<InstanceRow, StoreError> {
    Ok(InstanceRow {
        id: instance.id,
        template_id: instance.template_id,
        category: instance.category.clone(),
        company_id: instance.company_id.clone(),
        initiator_id: instance.initiator_id.clone(),
        initiated_at: instance.initiated_at,
        current_step_order: to_i32(instance.current_step_order, "current_step_order")?,
        status: instance.status.as_str().to_string(),
        current_step_started_at: instance.current_step_started_at,
        current_step_deadline_at: instance.current_step_deadline_at,
        auto_terminate_at: instance.auto_terminate_at,
        is_cross_company: instance.is_cross_company,
        cross_company_path: serde_json::to_value(&instance.cross_company_path)?,
        acting_company_id: instance.acting_company_id.clone(),
        current_approvers: serde_json::to_value(&instance.current_approvers)?,
        escalated: instance.escalated,
        sla: serde_json::to_value(&instance.sla)?,
        metadata: instance.metadata.clone(),
        revision: to_i64(instance.revision, "revision")?,
        chain_head: instance.chain_head.clone(),
        completed_at: instance.completed_at,
    })
}

fn instance_from_row(row: InstanceRow) -> Result<WorkflowInstance, StoreError> {
    Ok(WorkflowInstance {
        id: row.id,
        template_id: row.template_id,
        category: row.category,
        company_id: row.company_id,
        initiator_id: row.initiator_id,
        initiated_at: row.initiated_at,
        current_step_order: to_u32(row.current_step_order, "current_step_order")?,
        status: row.status.parse().map_err(StoreError::Corrupt)?,
        current_step_started_at: row.current_step_started_at,
        current_step_deadline_at: row.current_step_deadline_at,
        auto_terminate_at: row.auto_terminate_at,
        is_cross_company: row.is_cross_company,
        cross_company_path: serde_json::from_value(row.cross_company_path)?,
        acting_company_id: row.acting_company_id,
        current_approvers: serde_json::from_value(row.current_approvers)?,
        escalated: row.escalated,
        sla: serde_json::from_value(row.sla)?,
        metadata: row.metadata,
        revision: to_u64(row.revision, "revision")?,
        chain_head: row.chain_head,
        completed_at: row.completed_at,
    })
}

fn action_to_row(action: &StepAction) -> Result<StepActionRow, StoreError> {
    Ok(StepActionRow {
        id: action.id,
        instance_id: action.instance_id,
        sequence: to_i64(action.sequence, "sequence")?,
        step_order: to_i32(action.step_order, "step_order")?,
        actor_id: action.actor_id.clone(),
        action: action.action.as_str().to_string(),
        comment: action.comment.clone(),
        internal_notes: action.internal_notes.clone(),
        return_to_step: action.return_to_step.map(|s| to_i32(s, "return_to_step")).transpose()?,
        return_reason: action.return_reason.clone(),
        delegated_to: action.delegated_to.clone(),
        delegation_reason: action.delegation_reason.clone(),
        signature_text: action.signature_text.clone(),
        signed_at: action.signed_at,
        signer_ip: action.signer_ip.clone(),
        acted_at: action.acted_at,
        prev_hash: action.prev_hash.clone(),
        hash: action.hash.clone(),
    })
}

fn action_from_row(row: StepActionRow) -> Result<StepAction, StoreError> {
    Ok(StepAction {
        id: row.id,
        instance_id: row.instance_id,
        sequence: to_u64(row.sequence, "sequence")?,
        step_order: to_u32(row.step_order, "step_order")?,
        actor_id: row.actor_id,
        action: row.action.parse().map_err(StoreError::Corrupt)?,
        comment: row.comment,
        internal_notes: row.internal_notes,
        return_to_step: row.return_to_step.map(|s| to_u32(s, "return_to_step")).transpose()?,
        return_reason: row.return_reason,
        delegated_to: row.delegated_to,
        delegation_reason: row.delegation_reason,
        signature_text: row.signature_text,
        signed_at: row.signed_at,
        signer_ip: row.signer_ip,
        acted_at: row.acted_at,
        prev_hash: row.prev_hash,
        hash: row.hash,
    })
}

fn guard_to_row(guard: &TransitionGuard) -> Result<GuardRow, StoreError> {
    Ok(GuardRow {
        instance_id: guard.instance_id,
        status: guard.status.as_str().to_string(),
        current_step_order: to_i32(guard.current_step_order, "current_step_order")?,
        revision: to_i64(guard.revision, "revision")?,
    })
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<(), StoreError> {
        templates::insert_template(&self.pool, &template_to_row(template)?).await?;
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, StoreError> {
        optional(templates::get_template(&self.pool, id).await)?
            .map(template_from_row)
            .transpose()
    }

    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        instances::insert_instance(&self.pool, &instance_to_row(instance)?).await?;
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>, StoreError> {
        optional(instances::get_instance(&self.pool, id).await)?
            .map(instance_from_row)
            .transpose()
    }

    async fn commit(
        &self,
        guard: &TransitionGuard,
        instance: &WorkflowInstance,
        action: &StepAction,
    ) -> Result<(), StoreError> {
        instances::commit_transition(
            &self.pool,
            &guard_to_row(guard)?,
            &instance_to_row(instance)?,
            &action_to_row(action)?,
        )
        .await?;
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<WorkflowInstance>, StoreError> {
        instances::list_due(&self.pool, now)
            .await?
            .into_iter()
            .map(instance_from_row)
            .collect()
    }

    async fn list_for_approver(&self, actor_id: &str) -> Result<Vec<WorkflowInstance>, StoreError> {
        instances::list_for_approver(&self.pool, actor_id)
            .await?
            .into_iter()
            .map(instance_from_row)
            .collect()
    }

    async fn actions_for_instance(&self, instance_id: Uuid) -> Result<Vec<StepAction>, StoreError> {
        actions::list_actions(&self.pool, instance_id)
            .await?
            .into_iter()
            .map(action_from_row)
            .collect()
    }

    async fn has_open_action_at(
        &self,
        instance_id: Uuid,
        step_order: u32,
        kind: ActionKind,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let exists = actions::has_action_since(
            &self.pool,
            instance_id,
            to_i32(step_order, "step_order")?,
            kind.as_str(),
            since,
        )
        .await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionOptions, ApproverRule, InstanceStatus, SlaSnapshot, StepDefinition};
    use serde_json::json;

    fn sample_instance() -> WorkflowInstance {
        WorkflowInstance {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            category: "leave".into(),
            company_id: "acme".into(),
            initiator_id: "emp-1".into(),
            initiated_at: Utc::now(),
            current_step_order: 2,
            status: InstanceStatus::Returned,
            current_step_started_at: Some(Utc::now()),
            current_step_deadline_at: None,
            auto_terminate_at: None,
            is_cross_company: true,
            cross_company_path: vec![crate::models::CompanyHop {
                company_id: "globex".into(),
                company_name: "Globex".into(),
                step_order: 2,
            }],
            acting_company_id: "globex".into(),
            current_approvers: vec!["mgr-1".into()],
            escalated: false,
            sla: SlaSnapshot::not_started(),
            metadata: json!({"days": 3}),
            revision: 4,
            chain_head: Some("abc".into()),
            completed_at: None,
        }
    }

    #[test]
    fn instance_survives_row_conversion() {
        let instance = sample_instance();
        let row = instance_to_row(&instance).unwrap();
        assert_eq!(row.status, "returned");
        assert_eq!(row.current_approvers, json!(["mgr-1"]));
        assert_eq!(instance_from_row(row).unwrap(), instance);
    }

    #[test]
    fn unknown_status_is_reported_as_corrupt() {
        let mut row = instance_to_row(&sample_instance()).unwrap();
        row.status = "archived".into();
        assert!(matches!(instance_from_row(row), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn negative_step_order_is_reported_as_corrupt() {
        let mut row = instance_to_row(&sample_instance()).unwrap();
        row.current_step_order = -1;
        assert!(matches!(instance_from_row(row), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn template_definition_carries_steps() {
        let mut step = StepDefinition::new(1, "Manager", ApproverRule::ManagerOfSubject);
        step.escalation_hours = Some(24);
        let template = WorkflowTemplate::new("Leave", vec![step]);
        let row = template_to_row(&template).unwrap();
        assert_eq!(template_from_row(row).unwrap(), template);
    }

    #[test]
    fn action_row_keeps_return_target() {
        let options = ActionOptions {
            return_to_step: Some(1),
            return_reason: Some("missing receipt".into()),
            ..Default::default()
        };
        let action = StepAction::from_request(Uuid::new_v4(), 2, "mgr-1", ActionKind::Return, &options, Utc::now());
        let row = action_to_row(&action).unwrap();
        assert_eq!(row.action, "return");
        assert_eq!(row.return_to_step, Some(1));
        assert_eq!(action_from_row(row).unwrap(), action);
    }
}
