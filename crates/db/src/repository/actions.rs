//! Step action ledger. Insert and select only.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{DbError, models::StepActionRow};

const ACTION_COLUMNS: &str = "id, instance_id, sequence, step_order, actor_id, action, comment, \
     internal_notes, return_to_step, return_reason, delegated_to, delegation_reason, \
     signature_text, signed_at, signer_ip, acted_at, prev_hash, hash";

/// Append one action inside the caller's transaction.
pub(crate) async fn insert_action(
    tx: &mut Transaction<'_, Postgres>,
    row: &StepActionRow,
) -> Result<(), DbError> {
    sqlx::query(&format!(
        "INSERT INTO workflow_step_actions ({ACTION_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
    ))
    .bind(row.id)
    .bind(row.instance_id)
    .bind(row.sequence)
    .bind(row.step_order)
    .bind(&row.actor_id)
    .bind(&row.action)
    .bind(&row.comment)
    .bind(&row.internal_notes)
    .bind(row.return_to_step)
    .bind(&row.return_reason)
    .bind(&row.delegated_to)
    .bind(&row.delegation_reason)
    .bind(&row.signature_text)
    .bind(row.signed_at)
    .bind(&row.signer_ip)
    .bind(row.acted_at)
    .bind(&row.prev_hash)
    .bind(&row.hash)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Every action for an instance, in chain order.
pub async fn list_actions(pool: &PgPool, instance_id: Uuid) -> Result<Vec<StepActionRow>, DbError> {
    let rows = sqlx::query_as::<_, StepActionRow>(&format!(
        "SELECT {ACTION_COLUMNS} FROM workflow_step_actions \
         WHERE instance_id = $1 ORDER BY sequence ASC"
    ))
    .bind(instance_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Whether an action of kind `action` was logged against `step_order` at or
/// after `since` (i.e. during the current visit to that step).
pub async fn has_action_since(
    pool: &PgPool,
    instance_id: Uuid,
    step_order: i32,
    action: &str,
    since: DateTime<Utc>,
) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM workflow_step_actions
            WHERE instance_id = $1 AND step_order = $2 AND action = $3 AND acted_at >= $4
        )
        "#,
    )
    .bind(instance_id)
    .bind(step_order)
    .bind(action)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}
