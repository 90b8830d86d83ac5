//! Action validator: preconditions checked before any mutation.
//!
//! No side effects. The orchestrator calls [`validate_action`] on every
//! attempt of the read-validate-write cycle.

use crate::{
    ValidationError,
    models::{ActionKind, ActionOptions, StepDefinition, WorkflowInstance, WorkflowTemplate, non_blank},
};

/// Everything the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    pub instance: &'a WorkflowInstance,
    pub template: &'a WorkflowTemplate,
    pub step: &'a StepDefinition,
    pub action: ActionKind,
    pub actor_id: &'a str,
    pub options: &'a ActionOptions,
}

/// Check a requested action. Rules, in order:
///
/// 1. terminal instances accept nothing;
/// 2. only instances awaiting action accept human actions; a draft may only be cancelled;
/// 3. the caller's company authority, if stated, must match the step's;
/// 4. approve / reject / return / delegate need a current approver, cancel needs the initiator;
/// 5. approve / reject need a comment when the step requires one;
/// 6. approve / reject / return need a confirmed signature when the step requires one;
/// 7. return needs the template flag, an earlier target step and a reason;
/// 8. delegate needs a target other than the actor.
pub fn validate_action(req: &ActionRequest<'_>) -> Result<(), ValidationError> {
    let ActionRequest { instance, template, step, action, actor_id, options } = *req;

    if instance.status.is_terminal() {
        return Err(ValidationError::TerminalState { status: instance.status });
    }

    if matches!(action, ActionKind::Activate | ActionKind::AutoTerminate) {
        return Err(ValidationError::UnsupportedAction(action));
    }

    if !instance.status.is_awaiting_action() && action != ActionKind::Cancel {
        return Err(ValidationError::NotActionable { status: instance.status, action });
    }

    if let Some(company) = options.acting_company_id.as_deref() {
        if company != instance.acting_company_id {
            return Err(ValidationError::WrongCompany {
                expected: instance.acting_company_id.clone(),
                actual: company.to_owned(),
            });
        }
    }

    match action {
        ActionKind::Approve | ActionKind::Reject | ActionKind::Return | ActionKind::Delegate => {
            if !instance.current_approvers.is_empty() && !instance.is_approver(actor_id) {
                return Err(ValidationError::NotAnApprover { actor_id: actor_id.to_owned() });
            }
        }
        ActionKind::Cancel => {
            if actor_id != instance.initiator_id {
                return Err(ValidationError::NotInitiator { actor_id: actor_id.to_owned() });
            }
        }
        _ => {}
    }

    let decision = matches!(action, ActionKind::Approve | ActionKind::Reject);

    if decision && step.requires_comment && non_blank(&options.comment).is_none() {
        return Err(ValidationError::CommentRequired { step_order: step.order });
    }

    // A return leaves the step too, so it is signed like a decision.
    let signed = decision || action == ActionKind::Return;
    if signed && step.requires_signature {
        if non_blank(&options.signature_text).is_none() {
            return Err(ValidationError::SignatureRequired { step_order: step.order });
        }
        if !options.signature_confirmed {
            return Err(ValidationError::SignatureNotConfirmed);
        }
    }

    match action {
        ActionKind::Return => validate_return(instance, template, options),
        ActionKind::Delegate => match non_blank(&options.delegate_to) {
            None => Err(ValidationError::DelegateTargetRequired),
            Some(target) if target == actor_id => Err(ValidationError::DelegateToSelf),
            Some(_) => Ok(()),
        },
        _ => Ok(()),
    }
}

fn validate_return(
    instance: &WorkflowInstance,
    template: &WorkflowTemplate,
    options: &ActionOptions,
) -> Result<(), ValidationError> {
    if !template.allow_return_to_previous {
        return Err(ValidationError::ReturnNotAllowed);
    }

    let current = instance.current_step_order;
    let requested = options.return_to_step.unwrap_or(current);
    if requested >= current || template.step(requested).is_none() {
        return Err(ValidationError::InvalidReturnTarget { requested, current });
    }

    if non_blank(&options.return_reason).is_none() {
        return Err(ValidationError::ReturnReasonRequired);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApproverRule, InstanceStatus, SlaSnapshot};
    use chrono::Utc;
    use uuid::Uuid;

    fn template() -> WorkflowTemplate {
        let mut first = StepDefinition::new(1, "Manager", ApproverRule::ManagerOfSubject);
        first.requires_comment = true;
        let mut second = StepDefinition::new(2, "HR", ApproverRule::Role { role: "hr".into() });
        second.requires_signature = true;
        let mut t = WorkflowTemplate::new("leave", vec![first, second]);
        t.allow_return_to_previous = true;
        t
    }

    fn instance(step: u32, status: InstanceStatus) -> WorkflowInstance {
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
            current_approvers: vec!["mgr".into()],
            escalated: false,
            sla: SlaSnapshot::not_started(),
            metadata: serde_json::json!({}),
            revision: 1,
            chain_head: None,
            completed_at: None,
        }
    }

    fn check(
        inst: &WorkflowInstance,
        action: ActionKind,
        actor: &str,
        options: &ActionOptions,
    ) -> Result<(), ValidationError> {
        let t = template();
        let step = t.step(inst.current_step_order).unwrap().clone();
        validate_action(&ActionRequest {
            instance: inst,
            template: &t,
            step: &step,
            action,
            actor_id: actor,
            options,
        })
    }

    #[test]
    fn terminal_instance_rejects_everything() {
        let inst = instance(1, InstanceStatus::Approved);
        for action in [ActionKind::Approve, ActionKind::Comment, ActionKind::Cancel] {
            assert_eq!(
                check(&inst, action, "mgr", &ActionOptions::default()),
                Err(ValidationError::TerminalState { status: InstanceStatus::Approved })
            );
        }
    }

    #[test]
    fn draft_is_not_actionable() {
        let inst = instance(1, InstanceStatus::Draft);
        assert!(matches!(
            check(&inst, ActionKind::Approve, "mgr", &ActionOptions::default()),
            Err(ValidationError::NotActionable { .. })
        ));
    }

    #[test]
    fn comment_required_for_decisions_only() {
        let inst = instance(1, InstanceStatus::Pending);
        assert_eq!(
            check(&inst, ActionKind::Approve, "mgr", &ActionOptions::default()),
            Err(ValidationError::CommentRequired { step_order: 1 })
        );
        let opts = ActionOptions { comment: Some("fine".into()), ..Default::default() };
        assert_eq!(check(&inst, ActionKind::Approve, "mgr", &opts), Ok(()));
        // a plain comment action is not gated by requires_comment
        assert_eq!(check(&inst, ActionKind::Comment, "anyone", &ActionOptions::default()), Ok(()));
    }

    #[test]
    fn signature_needs_text_and_confirmation() {
        let mut inst = instance(2, InstanceStatus::InProgress);
        inst.current_approvers = vec!["hr-1".into()];

        assert_eq!(
            check(&inst, ActionKind::Approve, "hr-1", &ActionOptions::default()),
            Err(ValidationError::SignatureRequired { step_order: 2 })
        );

        let unconfirmed = ActionOptions { signature_text: Some("Jane Doe".into()), ..Default::default() };
        assert_eq!(
            check(&inst, ActionKind::Approve, "hr-1", &unconfirmed),
            Err(ValidationError::SignatureNotConfirmed)
        );

        let signed = ActionOptions { signature_confirmed: true, ..unconfirmed };
        assert_eq!(check(&inst, ActionKind::Approve, "hr-1", &signed), Ok(()));
    }

    #[test]
    fn returning_from_a_signed_step_needs_a_signature() {
        let mut inst = instance(2, InstanceStatus::InProgress);
        inst.current_approvers = vec!["hr-1".into()];

        let unsigned = ActionOptions {
            return_to_step: Some(1),
            return_reason: Some("missing dates".into()),
            ..Default::default()
        };
        assert_eq!(
            check(&inst, ActionKind::Return, "hr-1", &unsigned),
            Err(ValidationError::SignatureRequired { step_order: 2 })
        );

        let signed = ActionOptions {
            signature_text: Some("Jane Doe".into()),
            signature_confirmed: true,
            ..unsigned
        };
        assert_eq!(check(&inst, ActionKind::Return, "hr-1", &signed), Ok(()));

        // a comment leaves the step where it is
        assert_eq!(check(&inst, ActionKind::Comment, "hr-1", &ActionOptions::default()), Ok(()));
    }

    #[test]
    fn return_rules() {
        let mut inst = instance(2, InstanceStatus::InProgress);
        inst.current_approvers = vec!["hr-1".into()];

        let to = |step: u32, reason: Option<&str>| ActionOptions {
            return_to_step: Some(step),
            return_reason: reason.map(String::from),
            signature_text: Some("Jane Doe".into()),
            signature_confirmed: true,
            ..Default::default()
        };

        assert_eq!(
            check(&inst, ActionKind::Return, "hr-1", &to(2, Some("again"))),
            Err(ValidationError::InvalidReturnTarget { requested: 2, current: 2 })
        );
        assert_eq!(
            check(&inst, ActionKind::Return, "hr-1", &to(1, None)),
            Err(ValidationError::ReturnReasonRequired)
        );
        assert_eq!(check(&inst, ActionKind::Return, "hr-1", &to(1, Some("missing dates"))), Ok(()));
    }

    #[test]
    fn return_needs_template_flag() {
        let mut inst = instance(2, InstanceStatus::InProgress);
        inst.current_approvers.clear();
        let mut t = template();
        t.allow_return_to_previous = false;
        let step = t.step(2).unwrap().clone();
        let opts = ActionOptions {
            return_to_step: Some(1),
            return_reason: Some("x".into()),
            signature_text: Some("Jane Doe".into()),
            signature_confirmed: true,
            ..Default::default()
        };
        let result = validate_action(&ActionRequest {
            instance: &inst,
            template: &t,
            step: &step,
            action: ActionKind::Return,
            actor_id: "hr-1",
            options: &opts,
        });
        assert_eq!(result, Err(ValidationError::ReturnNotAllowed));
    }

    #[test]
    fn delegate_rules() {
        let inst = instance(1, InstanceStatus::Pending);
        assert_eq!(
            check(&inst, ActionKind::Delegate, "mgr", &ActionOptions::default()),
            Err(ValidationError::DelegateTargetRequired)
        );
        let to_self = ActionOptions { delegate_to: Some("mgr".into()), ..Default::default() };
        assert_eq!(check(&inst, ActionKind::Delegate, "mgr", &to_self), Err(ValidationError::DelegateToSelf));
        let other = ActionOptions { delegate_to: Some("deputy".into()), ..Default::default() };
        assert_eq!(check(&inst, ActionKind::Delegate, "mgr", &other), Ok(()));
    }

    #[test]
    fn only_assigned_approvers_decide_and_only_initiator_cancels() {
        let inst = instance(1, InstanceStatus::Pending);
        let opts = ActionOptions { comment: Some("no".into()), ..Default::default() };
        assert!(matches!(
            check(&inst, ActionKind::Reject, "stranger", &opts),
            Err(ValidationError::NotAnApprover { .. })
        ));
        assert!(matches!(
            check(&inst, ActionKind::Cancel, "mgr", &ActionOptions::default()),
            Err(ValidationError::NotInitiator { .. })
        ));
        assert_eq!(check(&inst, ActionKind::Cancel, "emp", &ActionOptions::default()), Ok(()));
    }

    #[test]
    fn acting_company_must_match_step_authority() {
        let inst = instance(1, InstanceStatus::Pending);
        let opts = ActionOptions {
            acting_company_id: Some("globex".into()),
            ..Default::default()
        };
        assert!(matches!(
            check(&inst, ActionKind::Comment, "mgr", &opts),
            Err(ValidationError::WrongCompany { .. })
        ));
    }
}
