//! `engine` crate: approval workflow domain model, SLA calculator, action
//! validator, transition table, store, escalation scanner and orchestrator.

pub mod models;
pub mod error;
pub mod template;
pub mod clock;
pub mod validator;
pub mod transition;
pub mod audit;
pub mod notify;
pub mod store;
pub mod orchestrator;
pub mod scanner;

pub use models::{
    ActionKind, ActionOptions, InstanceStatus, NewInstance, SlaSnapshot, SlaStatus, StepAction,
    StepDefinition, WorkflowInstance, WorkflowTemplate,
};
pub use error::{ChainError, EngineError, StoreError, TemplateError, ValidationError};
pub use clock::{Clock, ManualClock, SystemClock, compute_sla};
pub use template::validate_template;
pub use store::{MemoryStore, PgStore, WorkflowStore};
pub use orchestrator::{EngineConfig, WorkflowOrchestrator};
pub use scanner::{EscalationScanner, ScanReport, ScannerConfig};
