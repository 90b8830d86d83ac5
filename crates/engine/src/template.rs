//! Template validation: run this before persisting a template.
//!
//! Rules enforced:
//! 1. A template has at least one step.
//! 2. Step orders are unique and run 1, 2, … N with no gaps.
//! 3. Configured hour values are non-zero and at most [`MAX_HOURS`].
//! 4. `sla_warning_hours >= sla_critical_hours` when both are set.
//! 5. An `escalate` deadline policy names a non-blank target.
//!
//! Returns the step orders in ascending order on success.

use std::collections::HashSet;

use crate::{
    TemplateError,
    models::{DeadlinePolicy, WorkflowTemplate},
};

/// Longest window any hour field may configure: ten years.
pub const MAX_HOURS: u32 = 24 * 366 * 10;

/// Validate a template and return its step orders, sorted.
///
/// # Errors
/// The first [`TemplateError`] encountered.
pub fn validate_template(template: &WorkflowTemplate) -> Result<Vec<u32>, TemplateError> {
    if template.steps.is_empty() {
        return Err(TemplateError::NoSteps);
    }

    // -----------------------------------------------------------------------
    // 1. Unique, contiguous orders
    // -----------------------------------------------------------------------
    let mut seen: HashSet<u32> = HashSet::new();
    for step in &template.steps {
        if !seen.insert(step.order) {
            return Err(TemplateError::DuplicateStepOrder(step.order));
        }
    }

    let mut orders: Vec<u32> = seen.into_iter().collect();
    orders.sort_unstable();
    for (idx, &found) in orders.iter().enumerate() {
        let expected = idx as u32 + 1;
        if found != expected {
            return Err(TemplateError::NonContiguousOrder { expected, found });
        }
    }

    // -----------------------------------------------------------------------
    // 2. Per-step timing and escalation settings
    // -----------------------------------------------------------------------
    for step in &template.steps {
        let hours = [
            ("escalation_hours", step.escalation_hours),
            ("deadline_hours", step.deadline_hours),
            ("sla_warning_hours", step.sla_warning_hours),
            ("sla_critical_hours", step.sla_critical_hours),
        ];
        if let Some(&(field, _)) = hours.iter().find(|(_, h)| *h == Some(0)) {
            return Err(TemplateError::ZeroHours { step_order: step.order, field });
        }
        if let Some(&(field, _)) = hours.iter().find(|(_, h)| h.is_some_and(|h| h > MAX_HOURS)) {
            return Err(TemplateError::HoursOutOfRange {
                step_order: step.order,
                field,
                max: MAX_HOURS,
            });
        }

        if let (Some(warning), Some(critical)) = (step.sla_warning_hours, step.sla_critical_hours) {
            if warning < critical {
                return Err(TemplateError::ThresholdOrder { step_order: step.order });
            }
        }

        if let DeadlinePolicy::Escalate { to } = &step.on_deadline {
            if to.trim().is_empty() {
                return Err(TemplateError::BlankEscalationTarget { step_order: step.order });
            }
        }
    }

    match template.auto_terminate_hours {
        Some(0) => {
            return Err(TemplateError::ZeroHours { step_order: 0, field: "auto_terminate_hours" });
        }
        Some(h) if h > MAX_HOURS => {
            return Err(TemplateError::HoursOutOfRange {
                step_order: 0,
                field: "auto_terminate_hours",
                max: MAX_HOURS,
            });
        }
        _ => {}
    }

    Ok(orders)
}
