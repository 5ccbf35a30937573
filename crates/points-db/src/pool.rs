use std::time::Duration;

use points_core::constants::{
    DB_POOL_MAX_IDLE_SECS, DB_POOL_MAX_LIFETIME_SECS, DB_POOL_MAX_OPEN, DB_POOL_MIN_IDLE,
};
use points_core::error::{db_error, CoreError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connection-pool tunables. Defaults match 's shipped-with-the-implementer
/// values; override from config/env for a specific deployment.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub database_url: String,
    pub min_idle: u32,
    pub max_open: u32,
    pub max_lifetime: Duration,
    pub max_idle: Duration,
}

impl PoolConfig {
    pub fn from_database_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            min_idle: DB_POOL_MIN_IDLE,
            max_open: DB_POOL_MAX_OPEN,
            max_lifetime: Duration::from_secs(DB_POOL_MAX_LIFETIME_SECS),
            max_idle: Duration::from_secs(DB_POOL_MAX_IDLE_SECS),
        }
    }
}

/// Open the pool and apply REPEATABLE READ as the session default isolation
/// level via `after_connect`.
pub async fn connect(config: &PoolConfig) -> Result<PgPool, CoreError> {
    PgPoolOptions::new()
        .min_connections(config.min_idle)
        .max_connections(config.max_open)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.max_idle)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL REPEATABLE READ")
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .map_err(|e| db_error(format!("connecting to database: {e}")))
}
