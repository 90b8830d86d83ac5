//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Domain types live in the `engine` crate, which converts to and from
//! these rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflow_templates
// ---------------------------------------------------------------------------

/// A persisted template row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON template (steps, flags, auto-terminate policy, …)
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_instances
// ---------------------------------------------------------------------------

/// A persisted workflow instance row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InstanceRow {
    pub id: Uuid,
    pub template_id: Uuid,
    pub category: String,
    pub company_id: String,
    pub initiator_id: String,
    pub initiated_at: DateTime<Utc>,
    pub current_step_order: i32,
    pub status: String,
    pub current_step_started_at: Option<DateTime<Utc>>,
    pub current_step_deadline_at: Option<DateTime<Utc>>,
    pub auto_terminate_at: Option<DateTime<Utc>>,
    pub is_cross_company: bool,
    /// JSON array of `{company_id, company_name, step_order}`.
    pub cross_company_path: serde_json::Value,
    pub acting_company_id: String,
    /// JSON array of user IDs.
    pub current_approvers: serde_json::Value,
    pub escalated: bool,
    /// Cached SLA snapshot for listing views.
    pub sla: serde_json::Value,
    pub metadata: serde_json::Value,
    pub revision: i64,
    pub chain_head: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// workflow_step_actions
// ---------------------------------------------------------------------------

/// A persisted (append-only) step action row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepActionRow {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub sequence: i64,
    pub step_order: i32,
    pub actor_id: String,
    pub action: String,
    pub comment: Option<String>,
    pub internal_notes: Option<String>,
    pub return_to_step: Option<i32>,
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

/// The optimistic-concurrency guard for a transition: the values the writer
/// read before validating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardRow {
    pub instance_id: Uuid,
    pub status: String,
    pub current_step_order: i32,
    pub revision: i64,
}
