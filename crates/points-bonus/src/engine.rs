use std::collections::HashMap;

use chrono::{DateTime, Utc};
use points_batch::BatchEngine;
use points_core::constants::{DEFAULT_DAILY_BONUS_POINTS, SYSTEM_SETTINGS_BONUS_POINTS_KEY};
use points_core::{BatchSource, CoreError, DailyBonus, DailyBonusId, LogicalDayPolicy, TransactionStatus, TransactionType, UserId};
use points_txn::TransactionManager;
use tracing::{debug, info};

/// A single normalized external access event, already resolved to a user.
#[derive(Debug, Clone)]
pub struct MatchedAccessEvent {
    pub external_event_id: String,
    pub user: UserId,
    pub accessed_at: DateTime<Utc>,
}

/// Reads the configured bonus-per-day amount, falling back to the default
/// when the setting is absent or unparsable.
pub async fn bonus_points_per_day(pool: &sqlx::PgPool) -> Result<i64, CoreError> {
    match points_db::repo::settings::get(pool, SYSTEM_SETTINGS_BONUS_POINTS_KEY).await? {
        Some(raw) => Ok(raw.parse().unwrap_or(DEFAULT_DAILY_BONUS_POINTS)),
        None => Ok(DEFAULT_DAILY_BONUS_POINTS),
    }
}

/// Grants the daily bonus for one matched event, if this is the first event
/// this user has produced for its logical day. The `(user, bonus_date)`
/// unique constraint is the correctness guarantee, not the `try_insert`
/// return value — a `false` here just means "another concurrent cycle, or an
/// earlier event in this same batch, already handled today".
pub async fn grant_daily_bonus(
    manager: &TransactionManager,
    event: MatchedAccessEvent,
    day_policy: LogicalDayPolicy,
    bonus_points: i64,
    now: DateTime<Utc>,
) -> Result<bool, CoreError> {
    let bonus_date = day_policy.logical_day(event.accessed_at);

    manager
        .run(move |tx| {
            let event = event.clone();
            Box::pin(async move {
                let bonus = DailyBonus {
                    id: DailyBonusId::new(),
                    owner: event.user,
                    bonus_date,
                    bonus_points,
                    external_event_id: event.external_event_id.clone(),
                    event_at: Some(event.accessed_at),
                    created_at: now,
                };
                let inserted = points_db::repo::bonuses::try_insert(tx, &bonus).await?;
                if !inserted {
                    debug!(user = %event.user, %bonus_date, "daily bonus already granted for this logical day");
                    return Ok(false);
                }

                let txn = points_core::Transaction {
                    id: points_core::TransactionId::new(),
                    from_user: None,
                    to_user: Some(event.user),
                    amount: bonus_points,
                    kind: TransactionType::SystemGrant,
                    status: TransactionStatus::Completed,
                    idempotency_key: None,
                    description: format!("daily access bonus for {bonus_date}"),
                    metadata: HashMap::from([("external_event_id".to_string(), event.external_event_id.clone())]),
                    created_at: now,
                    completed_at: Some(now),
                };
                points_db::repo::transactions::insert(&mut **tx, &txn).await?;

                BatchEngine::credit(tx, event.user, bonus_points, BatchSource::DailyBonus, Some(txn.id), now).await?;

                info!(user = %event.user, %bonus_date, bonus_points, "granted daily access bonus");
                Ok(true)
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use points_txn::TransactionManager;

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
    fn a_second_event_on_the_same_logical_day_is_a_silent_skip() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-bonus DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let user = new_user(now);
            points_db::repo::users::insert(&pool, &user).await.expect("insert user");
            let manager = TransactionManager::new(pool.clone());
            let day_policy = LogicalDayPolicy::default();

            let first = MatchedAccessEvent { external_event_id: "evt-1".to_string(), user: user.id, accessed_at: now };
            let granted = grant_daily_bonus(&manager, first, day_policy, 5, now).await.expect("first grant");
            assert!(granted, "the first access event of the day must grant a bonus");

            let second = MatchedAccessEvent { external_event_id: "evt-2".to_string(), user: user.id, accessed_at: now };
            let granted_again = grant_daily_bonus(&manager, second, day_policy, 5, now).await.expect("second grant attempt");
            assert!(!granted_again, "a second event for the same (user, bonus_date) must not grant again");

            let reloaded = points_db::repo::users::find_by_id(&pool, user.id).await.unwrap();
            assert_eq!(reloaded.balance, 5, "only one bonus worth of points should have landed");
        });
    }
}
