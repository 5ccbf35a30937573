//! Idempotency guard wrapping money-moving operations.
//!
//! Every operation that mutates a balance is keyed by a client-supplied
//! [`IdempotencyKey`]. A fresh key runs the operation once; a key already
//! marked `completed` replays the prior outcome instead of running the
//! operation again; a key still `processing` means a concurrent call with
//! the same key is in flight right now.

use std::future::Future;

use chrono::{DateTime, Utc};
use points_core::error::in_progress;
use points_core::{CoreError, IdempotencyKey, IdempotencyStatus, TransactionId, UserId};
use sqlx::Postgres;

/// What happened when the guard was asked to run an operation under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyOutcome {
    /// No prior record existed; `op` ran and its transaction is new.
    Fresh(TransactionId),
    /// A `completed` record already existed; `op` did not run.
    Replayed(TransactionId),
}

impl IdempotencyOutcome {
    pub fn transaction_id(self) -> TransactionId {
        match self {
            IdempotencyOutcome::Fresh(id) | IdempotencyOutcome::Replayed(id) => id,
        }
    }
}

/// Runs `op` exactly once per `key`, inside the caller's open transaction.
///
/// `op` must itself persist whatever it produces (typically a `Transaction`
/// row) and return that row's id; this guard only manages the
/// `idempotency_keys` bookkeeping around it. A `processing` record belonging
/// to a still-live attempt surfaces `IN_PROGRESS` rather than blocking —
/// Postgres's row lock would do that for us if we let it, but a caller-visible
/// error is more useful than a hung request.
pub async fn with_idempotency<F, Fut>(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    key: &IdempotencyKey,
    owner: UserId,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
    op: F,
) -> Result<IdempotencyOutcome, CoreError>
where
    F: FnOnce(&mut sqlx::Transaction<'_, Postgres>) -> Fut,
    Fut: Future<Output = Result<TransactionId, CoreError>>,
{
    let key_str = key.as_str();
    let claimed = points_db::repo::idempotency::try_claim(tx, key_str, owner, now, now + ttl).await?;

    if !claimed {
        let existing = points_db::repo::idempotency::find_for_update(tx, key_str).await?;
        return match existing {
            Some(record) => match record.status {
                IdempotencyStatus::Completed => match record.transaction_id {
                    Some(id) => Ok(IdempotencyOutcome::Replayed(id)),
                    None => Err(in_progress(format!("idempotency key {key_str} completed with no transaction recorded"))),
                },
                IdempotencyStatus::Processing => Err(in_progress(format!("an operation with key {key_str} is already in flight"))),
                IdempotencyStatus::Failed => {
                    // A prior attempt failed outright (not a retryable
                    // serialization conflict, which never reaches here). Allow
                    // a fresh attempt under the same key.
                    run_and_record(tx, key_str, op).await
                }
            },
            None => Err(in_progress(format!("idempotency key {key_str} claim lost a race with no visible record"))),
        };
    }

    run_and_record(tx, key_str, op).await
}

async fn run_and_record<F, Fut>(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    key_str: &str,
    op: F,
) -> Result<IdempotencyOutcome, CoreError>
where
    F: FnOnce(&mut sqlx::Transaction<'_, Postgres>) -> Fut,
    Fut: Future<Output = Result<TransactionId, CoreError>>,
{
    match op(tx).await {
        Ok(transaction_id) => {
            points_db::repo::idempotency::complete(tx, key_str, transaction_id).await?;
            Ok(IdempotencyOutcome::Fresh(transaction_id))
        }
        Err(err) => {
            points_db::repo::idempotency::fail(tx, key_str).await?;
            Err(err)
        }
    }
}

/// Opportunistic cleanup of idempotency records past their TTL. Called from
/// the batch expiry sweeper's tick rather than on a dedicated timer.
pub async fn sweep_expired(pool: &sqlx::PgPool, now: DateTime<Utc>) -> Result<u64, CoreError> {
    points_db::repo::idempotency::delete_expired(pool, now).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use points_core::error::invalid_amount;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    proptest::proptest! {
        /// `transaction_id()` only ever unwraps the id carried inside either
        /// variant — the Fresh/Replayed distinction must never change which
        /// id callers see.
        #[test]
        fn transaction_id_is_stable_across_variants(bytes in proptest::array::uniform16(proptest::num::u8::ANY)) {
            let id = TransactionId::from(uuid::Uuid::from_bytes(bytes));
            proptest::prop_assert_eq!(IdempotencyOutcome::Fresh(id).transaction_id(), id);
            proptest::prop_assert_eq!(IdempotencyOutcome::Replayed(id).transaction_id(), id);
        }
    }

    fn db_pool() -> Option<sqlx::PgPool> {
        let url = std::env::var("DATABASE_URL").ok()?;
        Some(tokio_test::block_on(async {
            let pool = sqlx::postgres::PgPoolOptions::new().max_connections(5).connect(&url).await.expect("connect to scratch database");
            points_db::init_schema(&pool).await.expect("init schema");
            pool
        }))
    }

    fn new_user(now: DateTime<Utc>) -> points_core::User {
        let id = UserId::new();
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
    fn a_replayed_key_runs_the_operation_at_most_once() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-idempotency DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let user = new_user(now);
            points_db::repo::users::insert(&pool, &user).await.expect("insert user");
            let key = IdempotencyKey::parse("order-42").unwrap();
            let run_count = Arc::new(AtomicUsize::new(0));

            let mut tx = pool.begin().await.unwrap();
            let first = {
                let run_count = run_count.clone();
                with_idempotency(&mut tx, &key, user.id, now, chrono::Duration::hours(24), move |_tx| {
                    run_count.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async move { Ok(TransactionId::new()) })
                })
                .await
                .expect("first run")
            };
            let second = {
                let run_count = run_count.clone();
                with_idempotency(&mut tx, &key, user.id, now, chrono::Duration::hours(24), move |_tx| {
                    run_count.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async move { Ok(TransactionId::new()) })
                })
                .await
                .expect("second run replays instead of re-running")
            };

            assert!(matches!(first, IdempotencyOutcome::Fresh(_)));
            assert!(matches!(second, IdempotencyOutcome::Replayed(_)));
            assert_eq!(first.transaction_id(), second.transaction_id());
            assert_eq!(run_count.load(Ordering::SeqCst), 1, "op must not run a second time under the same key");
        });
    }

    #[test]
    fn a_key_still_processing_surfaces_in_progress_rather_than_blocking() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-idempotency DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let user = new_user(now);
            points_db::repo::users::insert(&pool, &user).await.expect("insert user");
            let key = IdempotencyKey::parse("order-already-in-flight").unwrap();

            let mut tx = pool.begin().await.unwrap();
            points_db::repo::idempotency::try_claim(&mut tx, key.as_str(), user.id, now, now + chrono::Duration::hours(24))
                .await
                .expect("claim key as processing");

            let err = with_idempotency(&mut tx, &key, user.id, now, chrono::Duration::hours(24), |_tx| {
                Box::pin(async move { Err(invalid_amount("should never run")) })
            })
            .await
            .unwrap_err();
            assert_eq!(err.kind(), points_core::ErrorKind::InProgress);
        });
    }
}
