//! Core domain models for the approval engine.
//!
//! These types are the source of truth for what a template, an instance and
//! a logged action look like in memory. The `db` crate persists them as rows;
//! conversion lives in [`crate::store::postgres`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use integrations::ApproverRule;

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// What the escalation scanner does once a step's deadline has passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeadlinePolicy {
    /// Overdue is shown, nothing else happens.
    #[default]
    None,
    /// Log an `escalate` action and notify `to`.
    Escalate { to: String },
    /// Close the instance as `auto_terminated`.
    AutoTerminate,
}

/// One ordered stage of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// 1-based, unique within the template.
    pub order: u32,
    pub name: String,
    pub approver: ApproverRule,
    #[serde(default)]
    pub requires_signature: bool,
    #[serde(default)]
    pub requires_comment: bool,
    /// Time-to-escalate from step start when no explicit deadline applies.
    #[serde(default)]
    pub escalation_hours: Option<u32>,
    /// Explicit per-step deadline override; wins over `escalation_hours`.
    #[serde(default)]
    pub deadline_hours: Option<u32>,
    /// Hours remaining before the deadline at which the step turns `warning`.
    #[serde(default)]
    pub sla_warning_hours: Option<u32>,
    /// Hours remaining before the deadline at which the step turns `critical`.
    #[serde(default)]
    pub sla_critical_hours: Option<u32>,
    /// Present when the step runs under another company's authority.
    #[serde(default)]
    pub target_company_id: Option<String>,
    #[serde(default)]
    pub target_company_name: Option<String>,
    #[serde(default)]
    pub on_deadline: DeadlinePolicy,
}

impl StepDefinition {
    pub fn new(order: u32, name: impl Into<String>, approver: ApproverRule) -> Self {
        Self {
            order,
            name: name.into(),
            approver,
            requires_signature: false,
            requires_comment: false,
            escalation_hours: None,
            deadline_hours: None,
            sla_warning_hours: None,
            sla_critical_hours: None,
            target_company_id: None,
            target_company_name: None,
            on_deadline: DeadlinePolicy::None,
        }
    }

    /// Hours from step start to the step deadline, if any is configured.
    pub fn deadline_window_hours(&self) -> Option<u32> {
        self.deadline_hours.or(self.escalation_hours)
    }
}

/// Immutable definition of a sign-off process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<StepDefinition>,
    /// Whether `return` is offered at all.
    #[serde(default)]
    pub allow_return_to_previous: bool,
    /// Hard stop measured from activation.
    #[serde(default)]
    pub auto_terminate_hours: Option<u32>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps,
            allow_return_to_previous: false,
            auto_terminate_hours: None,
            created_at: Utc::now(),
        }
    }

    pub fn step(&self, order: u32) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.order == order)
    }

    pub fn first_step(&self) -> Option<&StepDefinition> {
        self.steps.iter().min_by_key(|s| s.order)
    }

    /// The step that follows `order`, or `None` if `order` is the last one.
    pub fn next_step_after(&self, order: u32) -> Option<&StepDefinition> {
        self.steps
            .iter()
            .filter(|s| s.order > order)
            .min_by_key(|s| s.order)
    }

    /// True iff any step runs under a company other than `origin`.
    pub fn crosses_companies(&self, origin: &str) -> bool {
        self.steps
            .iter()
            .any(|s| s.target_company_id.as_deref().is_some_and(|c| c != origin))
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Draft,
    Pending,
    InProgress,
    Returned,
    Approved,
    Rejected,
    Cancelled,
    AutoTerminated,
}

impl InstanceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Cancelled | Self::AutoTerminated
        )
    }

    /// Waiting on a human at the current step.
    pub fn is_awaiting_action(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::Returned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft          => "draft",
            Self::Pending        => "pending",
            Self::InProgress     => "in_progress",
            Self::Returned       => "returned",
            Self::Approved       => "approved",
            Self::Rejected       => "rejected",
            Self::Cancelled      => "cancelled",
            Self::AutoTerminated => "auto_terminated",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft"           => Ok(Self::Draft),
            "pending"         => Ok(Self::Pending),
            "in_progress"     => Ok(Self::InProgress),
            "returned"        => Ok(Self::Returned),
            "approved"        => Ok(Self::Approved),
            "rejected"        => Ok(Self::Rejected),
            "cancelled"       => Ok(Self::Cancelled),
            "auto_terminated" => Ok(Self::AutoTerminated),
            other             => Err(format!("unknown instance status: {other}")),
        }
    }
}

/// Freshness classification of the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    OnTrack,
    Warning,
    Critical,
    Overdue,
    /// The instance-level hard stop has passed.
    Expired,
    /// Overlay: the current step has been escalated.
    Escalated,
}

/// Point-in-time SLA reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaSnapshot {
    pub status: SlaStatus,
    /// 0–100.
    pub percent_complete: f64,
    pub label: String,
}

impl SlaSnapshot {
    pub fn not_started() -> Self {
        Self {
            status: SlaStatus::OnTrack,
            percent_complete: 0.0,
            label: "not started".into(),
        }
    }
}

/// One company-authority boundary crossed by an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyHop {
    pub company_id: String,
    pub company_name: String,
    pub step_order: u32,
}

/// A single run of a template against one subject record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    /// Subject type tag; opaque to the engine.
    pub category: String,
    /// Origin company.
    pub company_id: String,
    pub initiator_id: String,
    pub initiated_at: DateTime<Utc>,
    pub current_step_order: u32,
    pub status: InstanceStatus,
    pub current_step_started_at: Option<DateTime<Utc>>,
    pub current_step_deadline_at: Option<DateTime<Utc>>,
    /// Set once at activation, never moved by step transitions.
    pub auto_terminate_at: Option<DateTime<Utc>>,
    pub is_cross_company: bool,
    pub cross_company_path: Vec<CompanyHop>,
    /// Company whose authority the current step executes under.
    pub acting_company_id: String,
    /// Users who may act on the current step. Empty means unrestricted.
    pub current_approvers: Vec<String>,
    /// Escalated during the current visit to the current step.
    pub escalated: bool,
    /// Last computed SLA reading; recomputed on read.
    pub sla: SlaSnapshot,
    /// Opaque subject metadata owned by the subject system.
    pub metadata: Value,
    /// Bumped by every committed transition; doubles as the action-log length.
    pub revision: u64,
    /// Hash of the latest logged action.
    pub chain_head: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_approver(&self, actor_id: &str) -> bool {
        self.current_approvers.iter().any(|a| a == actor_id)
    }
}

/// Input to `createInstance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInstance {
    pub template_id: Uuid,
    pub category: String,
    pub company_id: String,
    pub initiator_id: String,
    #[serde(default)]
    pub metadata: Value,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Every kind of entry in the step action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Activate,
    Approve,
    Reject,
    Return,
    Escalate,
    Delegate,
    Comment,
    Cancel,
    AutoTerminate,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activate      => "activate",
            Self::Approve       => "approve",
            Self::Reject        => "reject",
            Self::Return        => "return",
            Self::Escalate      => "escalate",
            Self::Delegate      => "delegate",
            Self::Comment       => "comment",
            Self::Cancel        => "cancel",
            Self::AutoTerminate => "auto_terminate",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activate"       => Ok(Self::Activate),
            "approve"        => Ok(Self::Approve),
            "reject"         => Ok(Self::Reject),
            "return"         => Ok(Self::Return),
            "escalate"       => Ok(Self::Escalate),
            "delegate"       => Ok(Self::Delegate),
            "comment"        => Ok(Self::Comment),
            "cancel"         => Ok(Self::Cancel),
            "auto_terminate" => Ok(Self::AutoTerminate),
            other            => Err(format!("unknown action: {other}")),
        }
    }
}

/// Caller-supplied options for `takeAction`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionOptions {
    #[serde(default)]
    pub comment: Option<String>,
    /// Visible only to users with approver capability.
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub signature_text: Option<String>,
    /// The caller affirmatively accepted the signature attestation.
    #[serde(default)]
    pub signature_confirmed: bool,
    #[serde(default)]
    pub signer_ip: Option<String>,
    #[serde(default)]
    pub return_to_step: Option<u32>,
    #[serde(default)]
    pub return_reason: Option<String>,
    #[serde(default)]
    pub delegate_to: Option<String>,
    #[serde(default)]
    pub delegation_reason: Option<String>,
    /// The step the caller was looking at. Defaults to the step read first.
    #[serde(default)]
    pub expected_step_order: Option<u32>,
    /// Company authority the caller acts under; checked against the step.
    #[serde(default)]
    pub acting_company_id: Option<String>,
}

/// Append-only record of one action against an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAction {
    pub id: Uuid,
    pub instance_id: Uuid,
    /// 1-based position in the instance's log.
    pub sequence: u64,
    /// The step the action was taken against.
    pub step_order: u32,
    pub actor_id: String,
    pub action: ActionKind,
    pub comment: Option<String>,
    pub internal_notes: Option<String>,
    pub return_to_step: Option<u32>,
    pub return_reason: Option<String>,
    pub delegated_to: Option<String>,
    pub delegation_reason: Option<String>,
    pub signature_text: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signer_ip: Option<String>,
    pub acted_at: DateTime<Utc>,
    pub prev_hash: Option<String>,
    pub hash: String,
}

impl StepAction {
    /// An unsealed action with no optional fields set.
    pub fn new(
        instance_id: Uuid,
        step_order: u32,
        actor_id: impl Into<String>,
        action: ActionKind,
        acted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance_id,
            sequence: 0,
            step_order,
            actor_id: actor_id.into(),
            action,
            comment: None,
            internal_notes: None,
            return_to_step: None,
            return_reason: None,
            delegated_to: None,
            delegation_reason: None,
            signature_text: None,
            signed_at: None,
            signer_ip: None,
            acted_at,
            prev_hash: None,
            hash: String::new(),
        }
    }

    /// Build the log entry for a human action from the request options.
    pub fn from_request(
        instance_id: Uuid,
        step_order: u32,
        actor_id: &str,
        action: ActionKind,
        options: &ActionOptions,
        acted_at: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self::new(instance_id, step_order, actor_id, action, acted_at);
        entry.comment = non_blank(&options.comment);
        entry.internal_notes = non_blank(&options.internal_notes);

        if let Some(signature) = non_blank(&options.signature_text) {
            if options.signature_confirmed {
                entry.signature_text = Some(signature);
                entry.signed_at = Some(acted_at);
                entry.signer_ip = non_blank(&options.signer_ip);
            }
        }

        match action {
            ActionKind::Return => {
                entry.return_to_step = options.return_to_step;
                entry.return_reason = non_blank(&options.return_reason);
            }
            ActionKind::Delegate => {
                entry.delegated_to = non_blank(&options.delegate_to);
                entry.delegation_reason = non_blank(&options.delegation_reason);
            }
            _ => {}
        }
        entry
    }

    /// Copy without `internal_notes`, for callers lacking approver capability.
    pub fn redacted(&self) -> Self {
        Self { internal_notes: None, ..self.clone() }
    }
}

/// `Some(trimmed)` unless the value is absent or whitespace.
pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
