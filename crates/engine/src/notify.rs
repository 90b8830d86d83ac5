//! Builds the notifications a committed transition should produce.
//!
//! Pure: the orchestrator and scanner call [`for_transition`] after the store
//! has accepted the commit and push the result onto the outbox queue.

use queue::Notification;
use serde_json::{Value, json};

use crate::models::{
    ActionKind, DeadlinePolicy, InstanceStatus, StepAction, WorkflowInstance, WorkflowTemplate,
};

pub const STEP_ASSIGNED: &str = "workflow.step_assigned";
pub const APPROVED: &str = "workflow.approved";
pub const REJECTED: &str = "workflow.rejected";
pub const RETURNED: &str = "workflow.returned";
pub const DELEGATED: &str = "workflow.delegated";
pub const ESCALATED: &str = "workflow.escalated";
pub const CANCELLED: &str = "workflow.cancelled";
pub const AUTO_TERMINATED: &str = "workflow.auto_terminated";

fn context(
    instance: &WorkflowInstance,
    template: &WorkflowTemplate,
    action: &StepAction,
    step_order: u32,
) -> Value {
    json!({
        "instance_id": instance.id,
        "template_name": template.name,
        "category": instance.category,
        "step_order": step_order,
        "step_name": template.step(step_order).map(|s| s.name.as_str()),
        "actor_id": action.actor_id,
        "action": action.action,
        "status": instance.status,
    })
}

/// Notifications for one committed transition.
///
/// `before` is the instance as read; `after` is what was committed.
pub fn for_transition(
    before: &WorkflowInstance,
    after: &WorkflowInstance,
    template: &WorkflowTemplate,
    action: &StepAction,
) -> Vec<Notification> {
    let mut out = Vec::new();
    let to = |recipient: &str, key: &str, step_order: u32| {
        Notification::new(recipient, key, after.id, context(after, template, action, step_order))
    };

    match action.action {
        ActionKind::Approve if after.status == InstanceStatus::Approved => {
            out.push(to(&after.initiator_id, APPROVED, action.step_order));
        }
        ActionKind::Reject => out.push(to(&after.initiator_id, REJECTED, action.step_order)),
        ActionKind::Return => out.push(to(&after.initiator_id, RETURNED, action.step_order)),
        ActionKind::Delegate => {
            if let Some(delegate) = action.delegated_to.as_deref() {
                out.push(to(delegate, DELEGATED, action.step_order));
            }
        }
        ActionKind::Escalate => {
            let target = template.step(action.step_order).and_then(|s| match &s.on_deadline {
                DeadlinePolicy::Escalate { to } => Some(to.as_str()),
                _ => None,
            });
            if let Some(target) = target {
                out.push(to(target, ESCALATED, action.step_order));
            }
        }
        ActionKind::Cancel => {
            for approver in &before.current_approvers {
                out.push(to(approver, CANCELLED, action.step_order));
            }
        }
        ActionKind::AutoTerminate => {
            out.push(to(&after.initiator_id, AUTO_TERMINATED, action.step_order));
        }
        _ => {}
    }

    // Step entry: the new approvers have work waiting.
    let entered = after.status.is_awaiting_action()
        && (after.current_step_order != before.current_step_order
            || after.current_step_started_at != before.current_step_started_at);
    if entered {
        for approver in &after.current_approvers {
            out.push(to(approver, STEP_ASSIGNED, after.current_step_order));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApproverRule, SlaSnapshot, StepDefinition};
    use chrono::Utc;
    use uuid::Uuid;

    fn template() -> WorkflowTemplate {
        let mut s1 = StepDefinition::new(1, "Manager", ApproverRule::ManagerOfSubject);
        s1.on_deadline = DeadlinePolicy::Escalate { to: "hr-lead".into() };
        let s2 = StepDefinition::new(2, "HR", ApproverRule::Role { role: "hr".into() });
        WorkflowTemplate::new("leave", vec![s1, s2])
    }

    fn instance(status: InstanceStatus, step: u32, approvers: &[&str]) -> WorkflowInstance {
        WorkflowInstance {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            category: "leave".into(),
            company_id: "acme".into(),
            initiator_id: "emp".into(),
            initiated_at: Utc::now(),
            current_step_order: step,
            status,
            current_step_started_at: Some(Utc::now()),
            current_step_deadline_at: None,
            auto_terminate_at: None,
            is_cross_company: false,
            cross_company_path: vec![],
            acting_company_id: "acme".into(),
            current_approvers: approvers.iter().map(|a| a.to_string()).collect(),
            escalated: false,
            sla: SlaSnapshot::not_started(),
            metadata: json!({}),
            revision: 1,
            chain_head: None,
            completed_at: None,
        }
    }

    #[test]
    fn approving_into_next_step_assigns_new_approvers() {
        let t = template();
        let before = instance(InstanceStatus::Pending, 1, &["mgr"]);
        let mut after = before.clone();
        after.status = InstanceStatus::InProgress;
        after.current_step_order = 2;
        after.current_approvers = vec!["hr-1".into(), "hr-2".into()];
        let action = StepAction::new(before.id, 1, "mgr", ActionKind::Approve, Utc::now());

        let sent = for_transition(&before, &after, &t, &action);
        let keys: Vec<_> = sent.iter().map(|n| (n.recipient_id.as_str(), n.template_key.as_str())).collect();
        assert_eq!(keys, vec![("hr-1", STEP_ASSIGNED), ("hr-2", STEP_ASSIGNED)]);
        assert_eq!(sent[0].context["step_name"], "HR");
    }

    #[test]
    fn final_approval_tells_the_initiator() {
        let t = template();
        let before = instance(InstanceStatus::InProgress, 2, &["hr-1"]);
        let mut after = before.clone();
        after.status = InstanceStatus::Approved;
        after.current_approvers.clear();
        let action = StepAction::new(before.id, 2, "hr-1", ActionKind::Approve, Utc::now());

        let sent = for_transition(&before, &after, &t, &action);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, "emp");
        assert_eq!(sent[0].template_key, APPROVED);
    }

    #[test]
    fn escalation_goes_to_the_configured_target() {
        let t = template();
        let before = instance(InstanceStatus::Pending, 1, &["mgr"]);
        let mut after = before.clone();
        after.escalated = true;
        let action = StepAction::new(before.id, 1, "system", ActionKind::Escalate, Utc::now());

        let sent = for_transition(&before, &after, &t, &action);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, "hr-lead");
        assert_eq!(sent[0].template_key, ESCALATED);
    }

    #[test]
    fn comment_is_silent() {
        let t = template();
        let before = instance(InstanceStatus::Pending, 1, &["mgr"]);
        let action = StepAction::new(before.id, 1, "mgr", ActionKind::Comment, Utc::now());
        assert!(for_transition(&before, &before.clone(), &t, &action).is_empty());
    }
}
