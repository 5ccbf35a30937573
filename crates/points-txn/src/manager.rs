use std::future::Future;
use std::pin::Pin;

use points_core::constants::{TXN_MANAGER_BACKOFF_BASE_MS, TXN_MANAGER_MAX_RETRIES};
use points_core::constants::SQLSTATE_SERIALIZATION_FAILURE;
use points_core::error::db_error;
use points_core::CoreError;
use rand::Rng;
use sqlx::{PgPool, Postgres};
use tracing::warn;

type BoxFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, CoreError>> + Send + 'c>>;

/// Coordinates a unit of work: opens a transaction, runs the closure against
/// it, and commits. On a `40001` serialization failure under the pool's
/// REPEATABLE READ isolation level it rolls back and retries the whole
/// closure from scratch, since Postgres gives no way to resume a failed
/// serializable transaction partway through.
#[derive(Debug, Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run<T, F>(&self, mut work: F) -> Result<T, CoreError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut sqlx::Transaction<'_, Postgres>) -> BoxFuture<'c, T> + Send,
    {
        let mut attempt = 0u32;
        loop {
            let mut tx = self.pool.begin().await.map_err(|e| db_error(format!("beginning transaction: {e}")))?;
            match work(&mut tx).await {
                Ok(value) => {
                    tx.commit().await.map_err(|e| db_error(format!("committing transaction: {e}")))?;
                    return Ok(value);
                }
                Err(err) if is_serialization_failure(&err) && attempt < TXN_MANAGER_MAX_RETRIES => {
                    let _ = tx.rollback().await;
                    attempt += 1;
                    let delay = backoff_with_jitter(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying transaction after serialization failure");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let _ = tx.rollback().await;
                    return Err(err);
                }
            }
        }
    }
}

fn is_serialization_failure(err: &CoreError) -> bool {
    err.message.contains(SQLSTATE_SERIALIZATION_FAILURE)
}

/// `50 * 2^n` ms, jittered uniformly within `[0, backoff/2)` to keep retrying
/// transactions from lockstepping against each other.
fn backoff_with_jitter(attempt: u32) -> std::time::Duration {
    let base = TXN_MANAGER_BACKOFF_BASE_MS * 2u64.saturating_pow(attempt.saturating_sub(1));
    let jitter = rand::thread_rng().gen_range(0..=(base / 2).max(1));
    std::time::Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt() {
        let first = backoff_with_jitter(1).as_millis();
        let third = backoff_with_jitter(3).as_millis();
        assert!(first >= TXN_MANAGER_BACKOFF_BASE_MS as u128);
        assert!(third >= (TXN_MANAGER_BACKOFF_BASE_MS * 4) as u128);
    }

    fn db_pool() -> Option<sqlx::PgPool> {
        let url = std::env::var("DATABASE_URL").ok()?;
        Some(tokio_test::block_on(async {
            let pool = sqlx::postgres::PgPoolOptions::new().max_connections(5).connect(&url).await.expect("connect to scratch database");
            points_db::init_schema(&pool).await.expect("init schema");
            pool
        }))
    }

    fn new_user(now: chrono::DateTime<chrono::Utc>) -> points_core::User {
        let id = points_core::UserId::new();
        points_core::User {
            id,
            username: format!("user-{id}"),
            email: format!("{id}@example.com"),
            password_hash: "unused".to_string(),
            last_name: "Test".to_string(),
            first_name: "User".to_string(),
            balance: 0,
            role: points_core::Role::User,
            version: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn a_successful_run_commits_its_write() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-txn DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = chrono::Utc::now();
            let user = new_user(now);
            let manager = TransactionManager::new(pool.clone());
            manager
                .run(move |tx| {
                    let user = user.clone();
                    Box::pin(async move { points_db::repo::users::insert(&mut **tx, &user).await })
                })
                .await
                .expect("run commits");

            let reloaded = points_db::repo::users::find_by_id(&pool, user.id).await;
            assert!(reloaded.is_ok(), "a committed write must be visible after run() returns");
        });
    }

    #[test]
    fn a_failed_run_rolls_back_its_write() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-txn DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = chrono::Utc::now();
            let user = new_user(now);
            let user_id = user.id;
            let manager = TransactionManager::new(pool.clone());
            let result = manager
                .run(move |tx| {
                    let user = user.clone();
                    Box::pin(async move {
                        points_db::repo::users::insert(&mut **tx, &user).await?;
                        Err(points_core::error::invalid_amount("force a rollback"))
                    })
                })
                .await;
            assert!(result.is_err());

            let reloaded = points_db::repo::users::find_by_id(&pool, user_id).await;
            assert!(reloaded.is_err(), "a rolled-back write must not be visible");
        });
    }
}
