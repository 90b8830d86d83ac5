//! Clock and deadline calculator.
//!
//! [`compute_sla`] is pure: it turns step timing plus thresholds into an
//! [`SlaSnapshot`] for a given `now`. Callers recompute on every read; the
//! instance caches the last value only for listing views.

use std::sync::Mutex;

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::{
    EngineError,
    models::{SlaSnapshot, SlaStatus, StepDefinition, WorkflowInstance, WorkflowTemplate},
};

/// Source of "now". Injected so tests and the scanner can control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time, truncated to microseconds (the precision Postgres keeps).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start.trunc_subsecs(6)))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = at.trunc_subsecs(6);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// `start + hours`, or `None` past the representable calendar range.
pub fn add_hours(start: DateTime<Utc>, hours: u32) -> Option<DateTime<Utc>> {
    start.checked_add_signed(Duration::hours(i64::from(hours)))
}

/// Deadline for a step entered at `started_at`: explicit override, else
/// `escalation_hours`, else none.
///
/// # Errors
/// [`EngineError::TimeOutOfRange`] when the window runs past the calendar.
pub fn deadline_for(
    step: &StepDefinition,
    started_at: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    step.deadline_window_hours()
        .map(|h| add_hours(started_at, h).ok_or(EngineError::TimeOutOfRange { hours: h }))
        .transpose()
}

/// Inputs to [`compute_sla`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SlaInput {
    pub step_started_at: Option<DateTime<Utc>>,
    pub step_deadline_at: Option<DateTime<Utc>>,
    pub escalation_hours: Option<u32>,
    pub sla_warning_hours: Option<u32>,
    pub sla_critical_hours: Option<u32>,
}

impl SlaInput {
    pub fn for_step(instance: &WorkflowInstance, step: &StepDefinition) -> Self {
        Self {
            step_started_at: instance.current_step_started_at,
            step_deadline_at: instance.current_step_deadline_at,
            escalation_hours: step.escalation_hours,
            sla_warning_hours: step.sla_warning_hours,
            sla_critical_hours: step.sla_critical_hours,
        }
    }
}

/// Classify the current step.
///
/// The window runs from step start to the explicit deadline, or spans
/// `escalation_hours` when no deadline was stored.
///
/// * `overdue` once the window has elapsed;
/// * with `sla_warning_hours` / `sla_critical_hours` set, `warning` and
///   `critical` fire when the hours remaining fall to those thresholds;
/// * otherwise `warning` at 75 %, `critical` at 90 % of the window;
/// * no window at all: always `on_track`, the label just reports elapsed time.
pub fn compute_sla(input: &SlaInput, now: DateTime<Utc>) -> SlaSnapshot {
    let Some(started) = input.step_started_at else {
        return SlaSnapshot::not_started();
    };
    let elapsed = (now - started).max(Duration::zero());

    let deadline = input.step_deadline_at.or_else(|| {
        input
            .escalation_hours
            .filter(|h| *h > 0)
            .and_then(|h| add_hours(started, h))
    });

    let Some(deadline) = deadline else {
        return SlaSnapshot {
            status: SlaStatus::OnTrack,
            percent_complete: 0.0,
            label: format!("{} elapsed", human_duration(elapsed)),
        };
    };

    let window = (deadline - started).num_seconds();
    let elapsed_secs = elapsed.num_seconds();
    let percent_complete = percent(elapsed_secs, window);

    if now >= deadline {
        return SlaSnapshot {
            status: SlaStatus::Overdue,
            percent_complete: 100.0,
            label: format!("overdue by {}", human_duration(now - deadline)),
        };
    }

    let remaining = deadline - now;
    let status = if input.sla_warning_hours.is_some() || input.sla_critical_hours.is_some() {
        let within = |hours: Option<u32>| {
            hours.is_some_and(|h| remaining <= Duration::hours(i64::from(h)))
        };
        if within(input.sla_critical_hours) {
            SlaStatus::Critical
        } else if within(input.sla_warning_hours) {
            SlaStatus::Warning
        } else {
            SlaStatus::OnTrack
        }
    } else {
        // Compare in integer space so 90 % of 10h is exactly 9h.
        let reached = |pct: i64| elapsed_secs * 100 >= window * pct;
        if reached(90) {
            SlaStatus::Critical
        } else if reached(75) {
            SlaStatus::Warning
        } else {
            SlaStatus::OnTrack
        }
    };

    SlaSnapshot {
        status,
        percent_complete,
        label: format!("{} remaining", human_duration(remaining)),
    }
}

/// Live SLA reading for a whole instance, including the terminal, expiry and
/// escalation overlays.
pub fn snapshot_for(
    instance: &WorkflowInstance,
    template: &WorkflowTemplate,
    now: DateTime<Utc>,
) -> SlaSnapshot {
    use crate::models::InstanceStatus;

    match instance.status {
        InstanceStatus::AutoTerminated => {
            return SlaSnapshot {
                status: SlaStatus::Expired,
                percent_complete: 100.0,
                label: "auto-terminated".into(),
            };
        }
        s if s.is_terminal() => {
            return SlaSnapshot {
                status: SlaStatus::OnTrack,
                percent_complete: 100.0,
                label: s.as_str().into(),
            };
        }
        InstanceStatus::Draft => return SlaSnapshot::not_started(),
        _ => {}
    }

    if instance.auto_terminate_at.is_some_and(|at| now >= at) {
        return SlaSnapshot {
            status: SlaStatus::Expired,
            percent_complete: 100.0,
            label: "past hard stop".into(),
        };
    }

    let Some(step) = template.step(instance.current_step_order) else {
        return SlaSnapshot::not_started();
    };

    let mut snapshot = compute_sla(&SlaInput::for_step(instance, step), now);
    if instance.escalated {
        snapshot.status = SlaStatus::Escalated;
    }
    snapshot
}

fn percent(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 100.0;
    }
    ((part as f64 * 100.0) / whole as f64).clamp(0.0, 100.0)
}

/// "2d 4h", "3h 20m", "45m", "<1m".
pub fn human_duration(d: Duration) -> String {
    let minutes = d.num_minutes().max(0);
    let (days, hours, mins) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);
    match (days, hours, mins) {
        (0, 0, 0) => "<1m".to_string(),
        (0, 0, m) => format!("{m}m"),
        (0, h, 0) => format!("{h}h"),
        (0, h, m) => format!("{h}h {m}m"),
        (d, 0, _) => format!("{d}d"),
        (d, h, _) => format!("{d}d {h}h"),
    }
}
