//! Tamper-evident hash chain over the step action log.
//!
//! Every action stores the hash of its predecessor (`prev_hash`) and its own
//! `hash` = SHA-256 over the canonical JSON of its content plus `prev_hash`.
//! Editing, dropping or reordering any entry breaks [`verify_chain`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    ChainError,
    models::{ActionKind, StepAction, WorkflowInstance},
};

/// The hashed view of an action: everything except `hash` itself.
#[derive(Serialize)]
struct Canonical<'a> {
    id: Uuid,
    instance_id: Uuid,
    sequence: u64,
    step_order: u32,
    actor_id: &'a str,
    action: ActionKind,
    comment: Option<&'a str>,
    internal_notes: Option<&'a str>,
    return_to_step: Option<u32>,
    return_reason: Option<&'a str>,
    delegated_to: Option<&'a str>,
    delegation_reason: Option<&'a str>,
    signature_text: Option<&'a str>,
    signed_at: Option<DateTime<Utc>>,
    signer_ip: Option<&'a str>,
    acted_at: DateTime<Utc>,
    prev_hash: Option<&'a str>,
}

impl<'a> From<&'a StepAction> for Canonical<'a> {
    fn from(a: &'a StepAction) -> Self {
        Self {
            id: a.id,
            instance_id: a.instance_id,
            sequence: a.sequence,
            step_order: a.step_order,
            actor_id: &a.actor_id,
            action: a.action,
            comment: a.comment.as_deref(),
            internal_notes: a.internal_notes.as_deref(),
            return_to_step: a.return_to_step,
            return_reason: a.return_reason.as_deref(),
            delegated_to: a.delegated_to.as_deref(),
            delegation_reason: a.delegation_reason.as_deref(),
            signature_text: a.signature_text.as_deref(),
            signed_at: a.signed_at,
            signer_ip: a.signer_ip.as_deref(),
            acted_at: a.acted_at,
            prev_hash: a.prev_hash.as_deref(),
        }
    }
}

/// Hex SHA-256 of the action's canonical form.
pub fn hash_action(action: &StepAction) -> Result<String, ChainError> {
    let bytes = serde_json::to_vec(&Canonical::from(action))
        .map_err(|e| ChainError::Encoding(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Link `action` onto the instance's chain and advance the instance revision.
///
/// Must be called on the instance copy that is about to be committed: the
/// store's revision guard then guarantees nobody else appended in between.
pub fn seal(instance: &mut WorkflowInstance, mut action: StepAction) -> Result<StepAction, ChainError> {
    action.instance_id = instance.id;
    action.sequence = instance.revision + 1;
    action.prev_hash = instance.chain_head.clone();
    action.hash = hash_action(&action)?;

    instance.revision = action.sequence;
    instance.chain_head = Some(action.hash.clone());
    Ok(action)
}

/// Verify a full log, oldest first.
pub fn verify_chain(actions: &[StepAction]) -> Result<(), ChainError> {
    let mut prev: Option<&str> = None;

    for (idx, action) in actions.iter().enumerate() {
        let expected = idx as u64 + 1;
        if action.sequence != expected {
            return Err(ChainError::SequenceGap { expected, found: action.sequence });
        }
        if action.prev_hash.as_deref() != prev {
            return Err(ChainError::BrokenLink { sequence: action.sequence });
        }
        if hash_action(action)? != action.hash {
            return Err(ChainError::HashMismatch { sequence: action.sequence });
        }
        prev = Some(&action.hash);
    }

    Ok(())
}
