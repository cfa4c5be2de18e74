//! Database adapters: connection pool and schema bootstrap.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::store::StoreError;

const SCHEMA: &str = include_str!("../sql/schema.sql");

/// Open the connection pool described by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::Backend(format!("failed to connect to database: {e}")))
}

/// Create tables and indexes if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Backend(format!("schema bootstrap failed: {e}")))?;
    tracing::info!("database schema ready");
    Ok(())
}
