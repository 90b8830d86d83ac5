//! Workflow instance persistence, including the guarded transition commit.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{GuardRow, InstanceRow, StepActionRow},
    repository::actions::insert_action,
};

const INSTANCE_COLUMNS: &str = "id, template_id, category, company_id, initiator_id, initiated_at, \
     current_step_order, status, current_step_started_at, current_step_deadline_at, \
     auto_terminate_at, is_cross_company, cross_company_path, acting_company_id, \
     current_approvers, escalated, sla, metadata, revision, chain_head, completed_at";

const TERMINAL_STATUSES: &str = "('approved', 'rejected', 'cancelled', 'auto_terminated')";

/// Insert a freshly created (draft) instance.
pub async fn insert_instance(pool: &PgPool, row: &InstanceRow) -> Result<(), DbError> {
    sqlx::query(&format!(
        "INSERT INTO workflow_instances ({INSTANCE_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
    ))
    .bind(row.id)
    .bind(row.template_id)
    .bind(&row.category)
    .bind(&row.company_id)
    .bind(&row.initiator_id)
    .bind(row.initiated_at)
    .bind(row.current_step_order)
    .bind(&row.status)
    .bind(row.current_step_started_at)
    .bind(row.current_step_deadline_at)
    .bind(row.auto_terminate_at)
    .bind(row.is_cross_company)
    .bind(&row.cross_company_path)
    .bind(&row.acting_company_id)
    .bind(&row.current_approvers)
    .bind(row.escalated)
    .bind(&row.sla)
    .bind(&row.metadata)
    .bind(row.revision)
    .bind(&row.chain_head)
    .bind(row.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single instance by its primary key.
pub async fn get_instance(pool: &PgPool, id: Uuid) -> Result<InstanceRow, DbError> {
    let row = sqlx::query_as::<_, InstanceRow>(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Non-terminal instances whose step deadline or hard stop lies before `now`.
pub async fn list_due(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<InstanceRow>, DbError> {
    let rows = sqlx::query_as::<_, InstanceRow>(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM workflow_instances \
         WHERE status NOT IN {TERMINAL_STATUSES} \
           AND (current_step_deadline_at < $1 OR auto_terminate_at < $1) \
         ORDER BY current_step_deadline_at ASC NULLS LAST"
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Active instances where `actor_id` is one of the current approvers.
pub async fn list_for_approver(pool: &PgPool, actor_id: &str) -> Result<Vec<InstanceRow>, DbError> {
    let rows = sqlx::query_as::<_, InstanceRow>(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM workflow_instances \
         WHERE status NOT IN {TERMINAL_STATUSES} AND status <> 'draft' \
           AND current_approvers ? $1 \
         ORDER BY current_step_deadline_at ASC NULLS LAST, initiated_at ASC"
    ))
    .bind(actor_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Apply a transition and append its action in one transaction.
///
/// The `UPDATE` only matches if the row still carries the guarded
/// `(status, current_step_order, revision)`; otherwise the transaction is
/// rolled back and [`DbError::Conflict`] is returned.
pub async fn commit_transition(
    pool: &PgPool,
    guard: &GuardRow,
    row: &InstanceRow,
    action: &StepActionRow,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE workflow_instances
        SET current_step_order = $1,
            status = $2,
            current_step_started_at = $3,
            current_step_deadline_at = $4,
            auto_terminate_at = $5,
            is_cross_company = $6,
            cross_company_path = $7,
            acting_company_id = $8,
            current_approvers = $9,
            escalated = $10,
            sla = $11,
            revision = $12,
            chain_head = $13,
            completed_at = $14
        WHERE id = $15 AND status = $16 AND current_step_order = $17 AND revision = $18
        "#,
    )
    .bind(row.current_step_order)
    .bind(&row.status)
    .bind(row.current_step_started_at)
    .bind(row.current_step_deadline_at)
    .bind(row.auto_terminate_at)
    .bind(row.is_cross_company)
    .bind(&row.cross_company_path)
    .bind(&row.acting_company_id)
    .bind(&row.current_approvers)
    .bind(row.escalated)
    .bind(&row.sla)
    .bind(row.revision)
    .bind(&row.chain_head)
    .bind(row.completed_at)
    .bind(guard.instance_id)
    .bind(&guard.status)
    .bind(guard.current_step_order)
    .bind(guard.revision)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DbError::Conflict);
    }

    insert_action(&mut tx, action).await?;
    tx.commit().await?;

    Ok(())
}
