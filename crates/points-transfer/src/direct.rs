use std::collections::HashMap;

use chrono::{DateTime, Utc};
use points_batch::BatchEngine;
use points_core::constants::idempotency_key_ttl;
use points_core::error::{invalid_amount, same_user, user_inactive};
use points_core::{BatchSource, CoreError, IdempotencyKey, TransactionStatus, TransactionType, UserId};
use points_idempotency::{with_idempotency, IdempotencyOutcome};
use points_txn::TransactionManager;
use sqlx::Postgres;

/// Immediate, synchronous transfer from `from` to `to`. The only
/// path that can outrun the recipient's control over whether to accept
/// points — `TransferRequest` exists precisely for the cases that
/// need the recipient's consent first.
pub async fn direct_transfer(
    manager: &TransactionManager,
    idempotency_key: &IdempotencyKey,
    from: UserId,
    to: UserId,
    amount: i64,
    description: &str,
    now: DateTime<Utc>,
) -> Result<IdempotencyOutcome, CoreError> {
    manager
        .run(move |tx| {
            Box::pin(async move {
                execute_in_tx(tx, idempotency_key, from, to, amount, description, now).await
            })
        })
        .await
}

/// The locked transfer itself, run inside a unit of work the caller already
/// has open. Shared by [`direct_transfer`] and by QR-token scanning, which
/// must consume the token in the same transaction as the points it releases.
pub(crate) async fn execute_in_tx<'a>(
    tx: &'a mut sqlx::Transaction<'_, Postgres>,
    idempotency_key: &'a IdempotencyKey,
    from: UserId,
    to: UserId,
    amount: i64,
    description: &'a str,
    now: DateTime<Utc>,
) -> Result<IdempotencyOutcome, CoreError> {
    if from == to {
        return Err(same_user(format!("cannot transfer from {from} to itself")));
    }
    if amount <= 0 {
        return Err(invalid_amount(format!("transfer amount must be positive, got {amount}")));
    }

    with_idempotency(tx, idempotency_key, from, now, idempotency_key_ttl(), |tx| {
        Box::pin(async move {
            // Lock both accounts in ascending user-id order, never in
            // caller-supplied order, so a concurrent A→B and B→A transfer
            // can never deadlock on each other's row locks.
            let (first_id, second_id) = if from <= to { (from, to) } else { (to, from) };
            let first = points_db::repo::users::find_by_id_for_update(tx, first_id).await?;
            let second = points_db::repo::users::find_by_id_for_update(tx, second_id).await?;
            let (sender, recipient) = if from == first_id { (first, second) } else { (second, first) };
            if !sender.is_active {
                return Err(user_inactive(format!("sender {from} is deactivated")));
            }
            if !recipient.is_active {
                return Err(user_inactive(format!("recipient {to} is deactivated")));
            }

            let txn_id = points_core::TransactionId::new();
            BatchEngine::debit(tx, from, amount, now).await?;
            BatchEngine::credit(tx, to, amount, BatchSource::Transfer, Some(txn_id), now).await?;

            let txn = points_core::Transaction {
                id: txn_id,
                from_user: Some(from),
                to_user: Some(to),
                amount,
                kind: TransactionType::Transfer,
                status: TransactionStatus::Completed,
                idempotency_key: Some(idempotency_key.as_str().to_string()),
                description: description.to_string(),
                metadata: HashMap::new(),
                created_at: now,
                completed_at: Some(now),
            };
            points_db::repo::transactions::insert(&mut **tx, &txn).await?;
            Ok(txn_id)
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use points_txn::TransactionManager;
    use proptest::prelude::*;

    proptest! {
        /// The locking order used throughout this module (`from <= to` picks
        /// the first id to lock) must agree with plain `UserId` ordering for
        /// every pair, or a concurrent A→B / B→A transfer could still lock
        /// in divergent orders.
        #[test]
        fn lock_order_matches_id_order(a in proptest::array::uniform16(proptest::num::u8::ANY), b in proptest::array::uniform16(proptest::num::u8::ANY)) {
            let from = UserId::from(uuid::Uuid::from_bytes(a));
            let to = UserId::from(uuid::Uuid::from_bytes(b));
            let (first, second) = if from <= to { (from, to) } else { (to, from) };
            prop_assert!(first <= second);
            prop_assert!(first == from || first == to);
            prop_assert!(second == from || second == to);
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

    fn new_user(balance: i64, now: chrono::DateTime<Utc>) -> points_core::User {
        let id = UserId::new();
        points_core::User {
            id,
            username: format!("user-{id}"),
            email: format!("{id}@example.com"),
            password_hash: "unused".to_string(),
            last_name: "Test".to_string(),
            first_name: "User".to_string(),
            balance,
            role: points_core::Role::User,
            version: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn a_transfer_conserves_the_total_and_a_replay_does_not_double_move() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-transfer DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let alice = new_user(100, now);
            let bob = new_user(0, now);
            points_db::repo::users::insert(&pool, &alice).await.unwrap();
            points_db::repo::users::insert(&pool, &bob).await.unwrap();

            let manager = TransactionManager::new(pool.clone());
            let key = IdempotencyKey::parse("xfer-1").unwrap();
            let outcome = direct_transfer(&manager, &key, alice.id, bob.id, 30, "test transfer", now).await.expect("transfer");
            assert!(matches!(outcome, IdempotencyOutcome::Fresh(_)));

            let alice_after = points_db::repo::users::find_by_id(&pool, alice.id).await.unwrap();
            let bob_after = points_db::repo::users::find_by_id(&pool, bob.id).await.unwrap();
            assert_eq!(alice_after.balance, 70);
            assert_eq!(bob_after.balance, 30);
            assert_eq!(alice_after.balance + bob_after.balance, 100, "a transfer must conserve the total across both accounts");

            let replay = direct_transfer(&manager, &key, alice.id, bob.id, 30, "test transfer", now).await.expect("replay");
            assert!(matches!(replay, IdempotencyOutcome::Replayed(_)));
            assert_eq!(replay.transaction_id(), outcome.transaction_id());

            let alice_after_replay = points_db::repo::users::find_by_id(&pool, alice.id).await.unwrap();
            assert_eq!(alice_after_replay.balance, 70, "replaying the same key must not move points twice");
        });
    }

    #[test]
    fn a_transfer_to_oneself_is_rejected() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-transfer DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let alice = new_user(100, now);
            points_db::repo::users::insert(&pool, &alice).await.unwrap();
            let manager = TransactionManager::new(pool.clone());
            let key = IdempotencyKey::parse("xfer-self").unwrap();
            let err = direct_transfer(&manager, &key, alice.id, alice.id, 10, "self", now).await.unwrap_err();
            assert_eq!(err.kind(), points_core::ErrorKind::SameUser);
        });
    }

    #[test]
    fn a_transfer_from_a_deactivated_sender_is_rejected() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-transfer DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let mut alice = new_user(100, now);
            alice.is_active = false;
            let bob = new_user(0, now);
            points_db::repo::users::insert(&pool, &alice).await.unwrap();
            points_db::repo::users::insert(&pool, &bob).await.unwrap();
            let manager = TransactionManager::new(pool.clone());
            let key = IdempotencyKey::parse("xfer-inactive").unwrap();
            let err = direct_transfer(&manager, &key, alice.id, bob.id, 10, "test", now).await.unwrap_err();
            assert_eq!(err.kind(), points_core::ErrorKind::UserInactive);
        });
    }
}
