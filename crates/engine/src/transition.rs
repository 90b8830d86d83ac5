//! The instance state machine.
//!
//! ```text
//! draft ─activate─▶ pending ─approve─▶ in_progress ─approve (last)─▶ approved
//!                      │                  │   ▲
//!                      │                  ▼   │ approve
//!                      │               returned
//!                      └──── reject / cancel / auto_terminate ──▶ terminal
//! ```
//!
//! Functions here mutate a *local copy* of an instance. Nothing is visible to
//! anyone else until the orchestrator (or scanner) commits that copy through
//! the store together with the logged action.

use chrono::{DateTime, Utc};

use crate::{
    EngineError,
    clock::{add_hours, deadline_for},
    models::{
        ActionKind, ActionOptions, CompanyHop, InstanceStatus, StepDefinition, WorkflowInstance,
        WorkflowTemplate, non_blank,
    },
};

/// What a transition did, beyond the instance fields themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Step the action was taken against.
    pub from_step: u32,
    /// Set when a step was (re-)entered and its approvers must be resolved.
    pub entered_step: Option<u32>,
}

/// `draft → pending`: start the first step's timers and the hard stop.
pub fn activate(
    instance: &mut WorkflowInstance,
    template: &WorkflowTemplate,
    now: DateTime<Utc>,
) -> Result<Outcome, EngineError> {
    if instance.status != InstanceStatus::Draft {
        return Err(EngineError::InvalidTransition {
            from: instance.status,
            action: ActionKind::Activate,
        });
    }

    let first = template
        .first_step()
        .ok_or(EngineError::UnknownStep { template_id: template.id, step_order: 1 })?;

    let from_step = instance.current_step_order;
    instance.status = InstanceStatus::Pending;
    instance.is_cross_company = template.crosses_companies(&instance.company_id);
    instance.auto_terminate_at = template
        .auto_terminate_hours
        .map(|h| add_hours(now, h).ok_or(EngineError::TimeOutOfRange { hours: h }))
        .transpose()?;
    enter_step(instance, first, now)?;

    Ok(Outcome { from_step, entered_step: Some(first.order) })
}

/// Apply a validated action to the instance.
///
/// `Activate` is rejected here; use [`activate`].
pub fn apply(
    instance: &mut WorkflowInstance,
    template: &WorkflowTemplate,
    action: ActionKind,
    options: &ActionOptions,
    now: DateTime<Utc>,
) -> Result<Outcome, EngineError> {
    let from_step = instance.current_step_order;
    let from_status = instance.status;
    let invalid = move || EngineError::InvalidTransition { from: from_status, action };

    if instance.status.is_terminal() {
        return Err(invalid());
    }
    if !instance.status.is_awaiting_action() && action != ActionKind::Cancel {
        return Err(invalid());
    }

    let mut entered_step = None;

    match action {
        ActionKind::Activate => return Err(invalid()),

        ActionKind::Approve => match template.next_step_after(from_step) {
            Some(next) => {
                instance.status = InstanceStatus::InProgress;
                enter_step(instance, next, now)?;
                entered_step = Some(next.order);
            }
            None => close(instance, InstanceStatus::Approved, now),
        },

        ActionKind::Reject => close(instance, InstanceStatus::Rejected, now),

        ActionKind::Return => {
            let target = options
                .return_to_step
                .and_then(|order| template.step(order))
                .filter(|step| step.order < from_step)
                .ok_or_else(invalid)?;
            instance.status = InstanceStatus::Returned;
            enter_step(instance, target, now)?;
            entered_step = Some(target.order);
        }

        // Notify-only: the step does not advance.
        ActionKind::Escalate => instance.escalated = true,

        ActionKind::Delegate => {
            let delegate = non_blank(&options.delegate_to).ok_or_else(invalid)?;
            instance.current_approvers = vec![delegate];
        }

        ActionKind::Comment => {}

        ActionKind::Cancel => close(instance, InstanceStatus::Cancelled, now),

        ActionKind::AutoTerminate => close(instance, InstanceStatus::AutoTerminated, now),
    }

    Ok(Outcome { from_step, entered_step })
}

/// Make `step` current: reset timers, clear the escalation overlay and record
/// a company hop if the step's authority differs from the current one.
fn enter_step(
    instance: &mut WorkflowInstance,
    step: &StepDefinition,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    instance.current_step_deadline_at = deadline_for(step, now)?;
    instance.current_step_order = step.order;
    instance.current_step_started_at = Some(now);
    instance.escalated = false;
    instance.current_approvers.clear();

    let company_id = step
        .target_company_id
        .clone()
        .unwrap_or_else(|| instance.company_id.clone());

    if company_id != instance.acting_company_id {
        let company_name = step
            .target_company_name
            .clone()
            .filter(|_| step.target_company_id.is_some())
            .unwrap_or_else(|| company_id.clone());

        instance.cross_company_path.push(CompanyHop {
            company_id: company_id.clone(),
            company_name,
            step_order: step.order,
        });
        instance.is_cross_company = true;
        instance.acting_company_id = company_id;
    }
    Ok(())
}

fn close(instance: &mut WorkflowInstance, status: InstanceStatus, now: DateTime<Utc>) {
    instance.status = status;
    instance.current_step_deadline_at = None;
    instance.escalated = false;
    instance.current_approvers.clear();
    instance.completed_at = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApproverRule, SlaSnapshot};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()
    }

    fn template() -> WorkflowTemplate {
        let mut s1 = StepDefinition::new(1, "Manager", ApproverRule::ManagerOfSubject);
        s1.escalation_hours = Some(24);
        let mut s2 = StepDefinition::new(2, "Group HR", ApproverRule::Role { role: "hr".into() });
        s2.target_company_id = Some("holdco".into());
        s2.target_company_name = Some("Holding Co".into());
        s2.deadline_hours = Some(8);
        s2.escalation_hours = Some(48);
        let s3 = StepDefinition::new(3, "Payroll", ApproverRule::Role { role: "payroll".into() });
        let mut t = WorkflowTemplate::new("transfer", vec![s1, s2, s3]);
        t.allow_return_to_previous = true;
        t.auto_terminate_hours = Some(720);
        t
    }

    fn draft() -> WorkflowInstance {
        WorkflowInstance {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            category: "transfer".into(),
            company_id: "acme".into(),
            initiator_id: "emp".into(),
            initiated_at: now(),
            current_step_order: 1,
            status: InstanceStatus::Draft,
            current_step_started_at: None,
            current_step_deadline_at: None,
            auto_terminate_at: None,
            is_cross_company: false,
            cross_company_path: vec![],
            acting_company_id: "acme".into(),
            current_approvers: vec![],
            escalated: false,
            sla: SlaSnapshot::not_started(),
            metadata: serde_json::json!({}),
            revision: 0,
            chain_head: None,
            completed_at: None,
        }
    }

    #[test]
    fn activation_starts_timers_and_hard_stop() {
        let t = template();
        let mut inst = draft();
        let out = activate(&mut inst, &t, now()).unwrap();

        assert_eq!(out.entered_step, Some(1));
        assert_eq!(inst.status, InstanceStatus::Pending);
        assert_eq!(inst.current_step_started_at, Some(now()));
        assert_eq!(inst.current_step_deadline_at, Some(now() + Duration::hours(24)));
        assert_eq!(inst.auto_terminate_at, Some(now() + Duration::hours(720)));
        assert!(inst.is_cross_company);
        assert!(inst.cross_company_path.is_empty(), "no hop until step 2 is reached");
    }

    #[test]
    fn activating_twice_is_invalid() {
        let t = template();
        let mut inst = draft();
        activate(&mut inst, &t, now()).unwrap();
        assert!(matches!(
            activate(&mut inst, &t, now()),
            Err(EngineError::InvalidTransition { from: InstanceStatus::Pending, .. })
        ));
    }

    #[test]
    fn approve_advances_and_records_company_hop() {
        let t = template();
        let mut inst = draft();
        activate(&mut inst, &t, now()).unwrap();
        let hard_stop = inst.auto_terminate_at;

        let later = now() + Duration::hours(3);
        let out = apply(&mut inst, &t, ActionKind::Approve, &ActionOptions::default(), later).unwrap();

        assert_eq!(out, Outcome { from_step: 1, entered_step: Some(2) });
        assert_eq!(inst.status, InstanceStatus::InProgress);
        assert_eq!(inst.current_step_started_at, Some(later));
        // explicit deadline override wins over escalation_hours
        assert_eq!(inst.current_step_deadline_at, Some(later + Duration::hours(8)));
        assert_eq!(inst.auto_terminate_at, hard_stop, "hard stop never moves");
        assert_eq!(
            inst.cross_company_path,
            vec![CompanyHop {
                company_id: "holdco".into(),
                company_name: "Holding Co".into(),
                step_order: 2,
            }]
        );
        assert_eq!(inst.acting_company_id, "holdco");
    }

    #[test]
    fn leaving_a_foreign_step_records_the_way_back() {
        let t = template();
        let mut inst = draft();
        activate(&mut inst, &t, now()).unwrap();
        apply(&mut inst, &t, ActionKind::Approve, &ActionOptions::default(), now()).unwrap();
        apply(&mut inst, &t, ActionKind::Approve, &ActionOptions::default(), now()).unwrap();

        assert_eq!(inst.current_step_order, 3);
        assert_eq!(inst.acting_company_id, "acme");
        assert_eq!(inst.cross_company_path.len(), 2);
        assert_eq!(inst.cross_company_path[1].company_name, "acme");
    }

    #[test]
    fn approving_last_step_closes_instance() {
        let t = template();
        let mut inst = draft();
        activate(&mut inst, &t, now()).unwrap();
        for _ in 0..3 {
            apply(&mut inst, &t, ActionKind::Approve, &ActionOptions::default(), now()).unwrap();
        }
        assert_eq!(inst.status, InstanceStatus::Approved);
        assert!(inst.current_step_deadline_at.is_none());
        assert_eq!(inst.completed_at, Some(now()));
        assert!(apply(&mut inst, &t, ActionKind::Comment, &ActionOptions::default(), now()).is_err());
    }

    #[test]
    fn return_resets_timers_at_target() {
        let t = template();
        let mut inst = draft();
        activate(&mut inst, &t, now()).unwrap();
        apply(&mut inst, &t, ActionKind::Approve, &ActionOptions::default(), now()).unwrap();

        let later = now() + Duration::hours(5);
        let opts = ActionOptions { return_to_step: Some(1), ..Default::default() };
        let out = apply(&mut inst, &t, ActionKind::Return, &opts, later).unwrap();

        assert_eq!(out.entered_step, Some(1));
        assert_eq!(inst.status, InstanceStatus::Returned);
        assert_eq!(inst.current_step_order, 1);
        assert_eq!(inst.current_step_deadline_at, Some(later + Duration::hours(24)));
    }

    #[test]
    fn escalate_and_delegate_do_not_move_the_step() {
        let t = template();
        let mut inst = draft();
        activate(&mut inst, &t, now()).unwrap();
        inst.current_approvers = vec!["mgr".into()];
        let deadline = inst.current_step_deadline_at;

        apply(&mut inst, &t, ActionKind::Escalate, &ActionOptions::default(), now()).unwrap();
        assert!(inst.escalated);

        let opts = ActionOptions { delegate_to: Some("deputy".into()), ..Default::default() };
        apply(&mut inst, &t, ActionKind::Delegate, &opts, now() + Duration::hours(1)).unwrap();

        assert_eq!(inst.current_step_order, 1);
        assert_eq!(inst.status, InstanceStatus::Pending);
        assert_eq!(inst.current_approvers, vec!["deputy"]);
        assert_eq!(inst.current_step_deadline_at, deadline);
    }

    #[test]
    fn draft_can_be_cancelled_but_not_approved() {
        let t = template();
        let mut inst = draft();
        assert!(apply(&mut inst, &t, ActionKind::Approve, &ActionOptions::default(), now()).is_err());
        apply(&mut inst, &t, ActionKind::Cancel, &ActionOptions::default(), now()).unwrap();
        assert_eq!(inst.status, InstanceStatus::Cancelled);
    }

    #[test]
    fn window_past_the_calendar_is_an_error_not_a_panic() {
        let mut s1 = StepDefinition::new(1, "Manager", ApproverRule::ManagerOfSubject);
        s1.escalation_hours = Some(u32::MAX);
        let t = WorkflowTemplate::new("leave", vec![s1]);
        let mut inst = draft();
        let err = activate(&mut inst, &t, now()).unwrap_err();
        assert!(matches!(err, EngineError::TimeOutOfRange { hours: u32::MAX }));
    }
}
