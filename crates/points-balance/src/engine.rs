use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use points_core::error::insufficient_balance;
use points_core::{CoreError, UserId};
use sqlx::Postgres;
use tracing::info;

/// A single signed change to one account's balance. Positive credits,
/// negative debits.
#[derive(Debug, Clone, Copy)]
pub struct BalanceAdjustment {
    pub user: UserId,
    pub delta: i64,
}

impl BalanceAdjustment {
    pub fn credit(user: UserId, amount: i64) -> Self {
        Self { user, delta: amount }
    }

    pub fn debit(user: UserId, amount: i64) -> Self {
        Self { user, delta: -amount }
    }
}

/// Applies a balance adjustment to zero, one, or several accounts inside one
/// transaction, enforcing the non-negative-balance invariant.
///
/// Distinct accounts are locked in ascending `UserId` order — never in the
/// order callers happen to supply them — so that two calls touching the same
/// pair of accounts in opposite directions (A→B and B→A) can never deadlock
/// against each other's row locks.
pub struct BalanceEngine;

impl BalanceEngine {
    /// Convenience wrapper for a single-account adjustment.
    pub async fn adjust(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        user: UserId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        Self::adjust_many(tx, &[BalanceAdjustment { user, delta }], now).await
    }

    pub async fn adjust_many(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        adjustments: &[BalanceAdjustment],
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if adjustments.is_empty() {
            return Ok(());
        }

        // Merge multiple adjustments to the same account before locking, so
        // a transfer-and-fee-on-the-same-account scenario only takes the row
        // lock once.
        let mut net: BTreeMap<UserId, i64> = BTreeMap::new();
        for adj in adjustments {
            *net.entry(adj.user).or_insert(0) += adj.delta;
        }

        let mut new_balances = Vec::with_capacity(net.len());
        for (&user, &delta) in net.iter() {
            let account = points_db::repo::users::find_by_id_for_update(tx, user).await?;
            let new_balance = account.balance + delta;
            if new_balance < 0 {
                return Err(insufficient_balance(format!(
                    "user {user} balance {} cannot absorb delta {delta}",
                    account.balance
                )));
            }
            new_balances.push((user, new_balance));
        }

        for (user, new_balance) in new_balances {
            points_db::repo::users::set_balance(tx, user, new_balance, now).await?;
        }

        info!(accounts = net.len(), "applied balance adjustment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    #[test]
    fn merges_adjustments_to_the_same_account() {
        let a = UserId::new();
        let adjustments = [BalanceAdjustment::credit(a, 10), BalanceAdjustment::debit(a, 3)];
        let mut net: BTreeMap<UserId, i64> = BTreeMap::new();
        for adj in adjustments {
            *net.entry(adj.user).or_insert(0) += adj.delta;
        }
        assert_eq!(net[&a], 7);
    }

    proptest! {
        /// Merging is just a sum, so it cannot depend on the order the
        /// individual adjustments arrived in.
        #[test]
        fn merge_sum_is_order_independent(deltas in proptest::collection::vec(-1000i64..1000, 0..20)) {
            let a = UserId::new();
            let forward: BTreeMap<UserId, i64> = {
                let mut net = BTreeMap::new();
                for &d in &deltas {
                    *net.entry(a).or_insert(0) += d;
                }
                net
            };
            let reversed: BTreeMap<UserId, i64> = {
                let mut net = BTreeMap::new();
                for &d in deltas.iter().rev() {
                    *net.entry(a).or_insert(0) += d;
                }
                net
            };
            prop_assert_eq!(forward.get(&a).copied().unwrap_or(0), reversed.get(&a).copied().unwrap_or(0));
            prop_assert_eq!(forward.get(&a).copied().unwrap_or(0), deltas.iter().sum::<i64>());
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
    fn adjust_increments_version_on_every_balance_mutation() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-balance DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let user = new_user(100, now);
            points_db::repo::users::insert(&pool, &user).await.expect("insert user");

            let mut tx = pool.begin().await.unwrap();
            BalanceEngine::adjust(&mut tx, user.id, 50, now).await.expect("credit");
            tx.commit().await.unwrap();

            let reloaded = points_db::repo::users::find_by_id(&pool, user.id).await.unwrap();
            assert_eq!(reloaded.balance, 150);
            assert_eq!(reloaded.version, 1, "a balance mutation must bump version");

            let mut tx = pool.begin().await.unwrap();
            BalanceEngine::adjust(&mut tx, user.id, -20, now).await.expect("debit");
            tx.commit().await.unwrap();

            let reloaded = points_db::repo::users::find_by_id(&pool, user.id).await.unwrap();
            assert_eq!(reloaded.balance, 130);
            assert_eq!(reloaded.version, 2, "each subsequent mutation bumps version again");
        });
    }

    #[test]
    fn adjust_rejects_a_debit_that_would_go_negative() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-balance DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let user = new_user(10, now);
            points_db::repo::users::insert(&pool, &user).await.expect("insert user");

            let mut tx = pool.begin().await.unwrap();
            let err = BalanceEngine::adjust(&mut tx, user.id, -50, now).await.unwrap_err();
            assert_eq!(err.kind(), points_core::ErrorKind::InsufficientBalance);
            drop(tx);

            let reloaded = points_db::repo::users::find_by_id(&pool, user.id).await.unwrap();
            assert_eq!(reloaded.balance, 10, "a rejected adjustment must not touch the stored balance");
        });
    }
}
