//! Postgres connection pool and schema migrations.

use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::DbError;

/// Shared Postgres pool for every store in the process.
pub type DbPool = PgPool;

/// Schema migrations embedded from `<workspace>/migrations` at build time.
static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Connection settings for [`create_pool`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    /// How long a caller waits for a free connection before erroring.
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn new(url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            url: url.into(),
            max_connections,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Open a pool. Approval actions are short transactions, so a small ceiling
/// (10–20) is plenty even under many concurrent approvers.
pub async fn create_pool(settings: &PoolSettings) -> Result<DbPool, DbError> {
    info!(
        max_connections = settings.max_connections,
        "connecting to approval store"
    );
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect(&settings.url)
        .await?;
    Ok(pool)
}

/// Apply any pending migrations; returns how many the binary knows about.
pub async fn run_migrations(pool: &DbPool) -> Result<usize, DbError> {
    let known = MIGRATOR.iter().count();
    info!("applying schema migrations ({known} known)");
    MIGRATOR.run(pool).await?;
    Ok(known)
}
