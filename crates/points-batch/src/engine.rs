use chrono::{DateTime, Duration, Utc};
use points_balance::BalanceEngine;
use points_core::constants::BATCH_LIFETIME_MONTHS;
use points_core::error::insufficient_batches;
use points_core::{BatchSource, CoreError, PointBatch, PointBatchId, TransactionId, UserId};
use sqlx::Postgres;
use tracing::debug;

/// FIFO point-batch bookkeeping layered over the balance engine.
///
/// `users.balance` is the number callers read; the batch table is the ledger
/// that makes expiration possible. Every credit and debit here keeps both in
/// lockstep inside the same transaction, so a crash between the two can
/// never happen — only a crash before either, or after both.
pub struct BatchEngine;

impl BatchEngine {
    pub fn default_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(30 * BATCH_LIFETIME_MONTHS as i64)
    }

    /// Credits `amount` to `owner` as one new batch, and raises the owner's
    /// balance by the same amount.
    pub async fn credit(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        owner: UserId,
        amount: i64,
        source: BatchSource,
        source_transaction: Option<TransactionId>,
        now: DateTime<Utc>,
    ) -> Result<PointBatchId, CoreError> {
        let batch = PointBatch {
            id: PointBatchId::new(),
            owner,
            original_amount: amount,
            remaining_amount: amount,
            source,
            source_transaction,
            created_at: now,
            expires_at: Self::default_expiry(now),
        };
        points_db::repo::batches::insert(&mut **tx, &batch).await?;
        BalanceEngine::adjust(tx, owner, amount, now).await?;
        debug!(%owner, amount, batch_id = %batch.id, "credited point batch");
        Ok(batch.id)
    }

    /// Debits `amount` from `owner`, consuming the oldest spendable batches
    /// first until the amount is covered.
    pub async fn debit(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        owner: UserId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let batches = points_db::repo::batches::list_spendable_for_update(tx, owner, now).await?;

        let mut remaining_to_consume = amount;
        let mut plan = Vec::new();
        for batch in batches {
            if remaining_to_consume == 0 {
                break;
            }
            let take = remaining_to_consume.min(batch.remaining_amount);
            plan.push((batch.id, take));
            remaining_to_consume -= take;
        }

        if remaining_to_consume > 0 {
            return Err(insufficient_batches(format!(
                "owner {owner} has insufficient unexpired batch coverage for {amount} (short by {remaining_to_consume})"
            )));
        }

        for (batch_id, take) in plan {
            points_db::repo::batches::decrement_remaining(tx, batch_id, take).await?;
        }
        BalanceEngine::adjust(tx, owner, -amount, now).await?;
        debug!(%owner, amount, "debited via FIFO batch consumption");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// `default_expiry` is a pure offset: whatever instant goes in, the
        /// batch lifetime it returns is always exactly the configured number
        /// of days later, never clamped or rounded.
        #[test]
        fn default_expiry_is_always_batch_lifetime_ahead(days_offset in 0i64..5_000) {
            let now = Utc::now() + Duration::days(days_offset);
            let expiry = BatchEngine::default_expiry(now);
            prop_assert_eq!((expiry - now).num_days(), 30 * BATCH_LIFETIME_MONTHS as i64);
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
    fn debit_consumes_oldest_batches_first_and_keeps_balance_in_lockstep() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-batch DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let user = new_user(now);
            points_db::repo::users::insert(&pool, &user).await.expect("insert user");

            let mut tx = pool.begin().await.unwrap();
            BatchEngine::credit(&mut tx, user.id, 30, BatchSource::Transfer, None, now - Duration::days(2)).await.expect("credit oldest");
            BatchEngine::credit(&mut tx, user.id, 50, BatchSource::Transfer, None, now - Duration::days(1)).await.expect("credit newer");
            tx.commit().await.unwrap();

            let mut tx = pool.begin().await.unwrap();
            BatchEngine::debit(&mut tx, user.id, 40, now).await.expect("debit across both batches");
            tx.commit().await.unwrap();

            let user_balance = points_db::repo::users::find_by_id(&pool, user.id).await.unwrap().balance;
            let mut read_tx = pool.begin().await.unwrap();
            let remaining_sum: i64 = points_db::repo::batches::list_spendable_for_update(&mut read_tx, user.id, now)
                .await
                .unwrap()
                .iter()
                .map(|b| b.remaining_amount)
                .sum();
            assert_eq!(user_balance, 40, "balance reflects 80 credited minus 40 debited");
            assert_eq!(remaining_sum, user_balance, "sum of remaining batch amounts must equal the balance");
        });
    }

    #[test]
    fn debit_rejects_an_amount_the_unexpired_batches_cannot_cover() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-batch DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let user = new_user(now);
            points_db::repo::users::insert(&pool, &user).await.expect("insert user");

            let mut tx = pool.begin().await.unwrap();
            BatchEngine::credit(&mut tx, user.id, 10, BatchSource::Transfer, None, now).await.expect("credit");
            tx.commit().await.unwrap();

            let mut tx = pool.begin().await.unwrap();
            let err = BatchEngine::debit(&mut tx, user.id, 100, now).await.unwrap_err();
            assert_eq!(err.kind(), points_core::ErrorKind::InsufficientBatches);
        });
    }
}

