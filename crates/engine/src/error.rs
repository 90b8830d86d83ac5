//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{ActionKind, InstanceStatus};

/// Structural problems in a template definition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template has no steps")]
    NoSteps,

    /// Two steps share the same order.
    #[error("duplicate step order: {0}")]
    DuplicateStepOrder(u32),

    /// Orders must run 1, 2, … N without gaps.
    #[error("step orders must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguousOrder { expected: u32, found: u32 },

    #[error("step {step_order}: {field} must be greater than zero")]
    ZeroHours { step_order: u32, field: &'static str },

    /// The warning threshold must fire no later than the critical one.
    #[error("step {step_order}: {field} must not exceed {max} hours")]
    HoursOutOfRange { step_order: u32, field: &'static str, max: u32 },

    #[error("step {step_order}: sla_warning_hours must be >= sla_critical_hours")]
    ThresholdOrder { step_order: u32 },

    #[error("step {step_order}: escalation target is blank")]
    BlankEscalationTarget { step_order: u32 },
}

/// Action preconditions that were not met. Reported to the caller, never
/// retried automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("instance is {status} and accepts no further actions")]
    TerminalState { status: InstanceStatus },

    #[error("instance is {status}; '{action}' is not accepted in that state")]
    NotActionable { status: InstanceStatus, action: ActionKind },

    #[error("'{0}' cannot be requested directly")]
    UnsupportedAction(ActionKind),

    #[error("step {step_order} requires a comment")]
    CommentRequired { step_order: u32 },

    #[error("step {step_order} requires a signature")]
    SignatureRequired { step_order: u32 },

    #[error("the signature attestation was not confirmed")]
    SignatureNotConfirmed,

    #[error("this template does not allow returning to a previous step")]
    ReturnNotAllowed,

    #[error("return target {requested} is not a step before the current step {current}")]
    InvalidReturnTarget { requested: u32, current: u32 },

    #[error("a return requires a reason")]
    ReturnReasonRequired,

    #[error("a delegation requires a target actor")]
    DelegateTargetRequired,

    #[error("cannot delegate to yourself")]
    DelegateToSelf,

    #[error("'{actor_id}' is not an approver for the current step")]
    NotAnApprover { actor_id: String },

    #[error("only the initiator may cancel")]
    NotInitiator { actor_id: String },

    #[error("current step runs under company '{expected}', caller acts for '{actual}'")]
    WrongCompany { expected: String, actual: String },
}

/// Broken links in the tamper-evident action log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("expected sequence {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("action {sequence} does not link to its predecessor")]
    BrokenLink { sequence: u64 },

    #[error("action {sequence} has been altered")]
    HashMismatch { sequence: u64 },

    #[error("cannot hash action: {0}")]
    Encoding(String),
}

/// Errors produced by a [`WorkflowStore`](crate::store::WorkflowStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `(status, current_step_order, revision)` guard no longer matches.
    #[error("optimistic concurrency guard tripped")]
    Conflict,

    #[error("record already exists: {0}")]
    Duplicate(Uuid),

    /// A persisted value could not be mapped back onto the domain model.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(db::DbError),
}

impl From<db::DbError> for StoreError {
    fn from(err: db::DbError) -> Self {
        match err {
            db::DbError::Conflict => StoreError::Conflict,
            other => StoreError::Database(other),
        }
    }
}

/// Errors surfaced by the orchestrator and scanner.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(ValidationError),

    #[error("instance {instance_id} is {status}")]
    TerminalState { instance_id: Uuid, status: InstanceStatus },

    /// Lost the optimistic-concurrency race and retries did not help.
    #[error("instance {instance_id} was modified concurrently")]
    ConcurrencyConflict { instance_id: Uuid },

    #[error("instance not found: {0}")]
    InstanceNotFound(Uuid),

    #[error("template not found: {0}")]
    TemplateNotFound(Uuid),

    #[error("invalid template: {0}")]
    InvalidTemplate(#[from] TemplateError),

    #[error("'{action}' is not a valid transition from {from}")]
    InvalidTransition { from: InstanceStatus, action: ActionKind },

    /// The instance points at a step its template does not define.
    #[error("step {step_order} is not defined by template {template_id}")]
    UnknownStep { template_id: Uuid, step_order: u32 },

    /// A configured window pushed a timestamp past the calendar's range.
    #[error("a window of {hours} hours runs past the supported date range")]
    TimeOutOfRange { hours: u32 },

    #[error("action log is corrupt: {0}")]
    Chain(#[from] ChainError),

    #[error("approver resolution failed: {0}")]
    Resolver(#[from] integrations::ResolveError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Map a validator rejection; terminal instances get their own variant.
    pub fn from_validation(instance_id: Uuid, err: ValidationError) -> Self {
        match err {
            ValidationError::TerminalState { status } => Self::TerminalState { instance_id, status },
            other => Self::Validation(other),
        }
    }
}
