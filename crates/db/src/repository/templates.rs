//! Template persistence.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::TemplateRow};

/// Insert a template. Templates are immutable once stored.
pub async fn insert_template(pool: &PgPool, row: &TemplateRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_templates (id, name, definition, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.definition)
    .bind(row.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single template by its primary key.
pub async fn get_template(pool: &PgPool, id: Uuid) -> Result<TemplateRow, DbError> {
    let row = sqlx::query_as::<_, TemplateRow>(
        r#"SELECT id, name, definition, created_at FROM workflow_templates WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}
