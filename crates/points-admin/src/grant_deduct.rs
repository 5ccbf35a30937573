use std::collections::HashMap;

use chrono::{DateTime, Utc};
use points_balance::BalanceEngine;
use points_batch::BatchEngine;
use points_core::constants::idempotency_key_ttl;
use points_core::error::{invalid_amount, unauthorized, user_inactive, user_not_found};
use points_core::{BatchSource, CoreError, IdempotencyKey, TransactionStatus, TransactionType, UserId};
use points_idempotency::{with_idempotency, IdempotencyOutcome};
use points_txn::TransactionManager;

async fn require_admin(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    admin: UserId,
) -> Result<(), CoreError> {
    // Always a fresh lookup against persisted state — never a cached role
    // captured at login.
    let admin_user = points_db::repo::users::find_by_id(&mut **tx, admin).await?;
    if !admin_user.role.is_admin() {
        return Err(unauthorized(format!("{admin} does not hold the admin role")));
    }
    if !admin_user.is_active {
        return Err(user_not_found(format!("admin account {admin} is deactivated")));
    }
    Ok(())
}

/// Grants `amount` points to `target`, creating a batch (`source =
/// admin_grant`) the way any ordinary credit would.
pub async fn grant_points(
    manager: &TransactionManager,
    idempotency_key: &IdempotencyKey,
    admin: UserId,
    target: UserId,
    amount: i64,
    description: &str,
    now: DateTime<Utc>,
) -> Result<IdempotencyOutcome, CoreError> {
    if amount <= 0 {
        return Err(invalid_amount(format!("grant amount must be positive, got {amount}")));
    }

    manager
        .run(move |tx| {
            Box::pin(async move {
                with_idempotency(tx, idempotency_key, admin, now, idempotency_key_ttl(), |tx| {
                    Box::pin(async move {
                        require_admin(tx, admin).await?;
                        let target_user = points_db::repo::users::find_by_id_for_update(tx, target).await?;
                        if !target_user.is_active {
                            return Err(user_inactive(format!("target {target} is deactivated")));
                        }

                        let txn_id = points_core::TransactionId::new();
                        BatchEngine::credit(tx, target, amount, BatchSource::AdminGrant, Some(txn_id), now).await?;

                        let txn = points_core::Transaction {
                            id: txn_id,
                            from_user: None,
                            to_user: Some(target),
                            amount,
                            kind: TransactionType::AdminGrant,
                            status: TransactionStatus::Completed,
                            idempotency_key: Some(idempotency_key.as_str().to_string()),
                            description: description.to_string(),
                            metadata: HashMap::from([("granted_by".to_string(), admin.to_string())]),
                            created_at: now,
                            completed_at: Some(now),
                        };
                        points_db::repo::transactions::insert(&mut **tx, &txn).await?;
                        Ok(txn_id)
                    })
                })
                .await
            })
        })
        .await
}

/// Deducts `amount` points from `target`. Deliberately bypasses the batch
/// engine: this debits aggregate balance directly and creates no batch —
/// a deduction isn't compensating against any one acquisition's lineage.
pub async fn deduct_points(
    manager: &TransactionManager,
    idempotency_key: &IdempotencyKey,
    admin: UserId,
    target: UserId,
    amount: i64,
    description: &str,
    now: DateTime<Utc>,
) -> Result<IdempotencyOutcome, CoreError> {
    if amount <= 0 {
        return Err(invalid_amount(format!("deduction amount must be positive, got {amount}")));
    }

    manager
        .run(move |tx| {
            Box::pin(async move {
                with_idempotency(tx, idempotency_key, admin, now, idempotency_key_ttl(), |tx| {
                    Box::pin(async move {
                        require_admin(tx, admin).await?;
                        let target_user = points_db::repo::users::find_by_id_for_update(tx, target).await?;
                        if !target_user.is_active {
                            return Err(user_inactive(format!("target {target} is deactivated")));
                        }

                        BalanceEngine::adjust(tx, target, -amount, now).await?;

                        let txn_id = points_core::TransactionId::new();
                        let txn = points_core::Transaction {
                            id: txn_id,
                            from_user: Some(target),
                            to_user: None,
                            amount,
                            kind: TransactionType::AdminDeduct,
                            status: TransactionStatus::Completed,
                            idempotency_key: Some(idempotency_key.as_str().to_string()),
                            description: description.to_string(),
                            metadata: HashMap::from([("deducted_by".to_string(), admin.to_string())]),
                            created_at: now,
                            completed_at: Some(now),
                        };
                        points_db::repo::transactions::insert(&mut **tx, &txn).await?;
                        Ok(txn_id)
                    })
                })
                .await
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_pool() -> Option<sqlx::PgPool> {
        let url = std::env::var("DATABASE_URL").ok()?;
        Some(tokio_test::block_on(async {
            let pool = sqlx::postgres::PgPoolOptions::new().max_connections(5).connect(&url).await.expect("connect to scratch database");
            points_db::init_schema(&pool).await.expect("init schema");
            pool
        }))
    }

    fn new_user(role: points_core::Role, now: DateTime<Utc>) -> points_core::User {
        let id = UserId::new();
        points_core::User {
            id,
            username: format!("user-{id}"),
            email: format!("{id}@example.com"),
            password_hash: "unused".to_string(),
            last_name: "Test".to_string(),
            first_name: "User".to_string(),
            balance: 0,
            role,
            version: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn a_non_admin_may_not_grant_points() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-admin DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let non_admin = new_user(points_core::Role::User, now);
            let target = new_user(points_core::Role::User, now);
            points_db::repo::users::insert(&pool, &non_admin).await.unwrap();
            points_db::repo::users::insert(&pool, &target).await.unwrap();

            let manager = TransactionManager::new(pool.clone());
            let key = IdempotencyKey::parse("grant-1").unwrap();
            let err = grant_points(&manager, &key, non_admin.id, target.id, 10, "test grant", now).await.unwrap_err();
            assert_eq!(err.kind(), points_core::ErrorKind::Unauthorized);

            let reloaded = points_db::repo::users::find_by_id(&pool, target.id).await.unwrap();
            assert_eq!(reloaded.balance, 0, "a rejected grant must never move points");
        });
    }

    #[test]
    fn grant_then_deduct_conserves_total_points() {
        let Some(pool) = db_pool() else {
            eprintln!("DATABASE_URL not set, skipping points-admin DB test");
            return;
        };
        tokio_test::block_on(async {
            let now = Utc::now();
            let admin = new_user(points_core::Role::Admin, now);
            let target = new_user(points_core::Role::User, now);
            points_db::repo::users::insert(&pool, &admin).await.unwrap();
            points_db::repo::users::insert(&pool, &target).await.unwrap();

            let manager = TransactionManager::new(pool.clone());
            let grant_key = IdempotencyKey::parse("grant-2").unwrap();
            grant_points(&manager, &grant_key, admin.id, target.id, 100, "welcome grant", now).await.expect("grant");
            let after_grant = points_db::repo::users::find_by_id(&pool, target.id).await.unwrap();
            assert_eq!(after_grant.balance, 100);

            let deduct_key = IdempotencyKey::parse("deduct-2").unwrap();
            deduct_points(&manager, &deduct_key, admin.id, target.id, 40, "correction", now).await.expect("deduct");
            let after_deduct = points_db::repo::users::find_by_id(&pool, target.id).await.unwrap();
            assert_eq!(after_deduct.balance, 60, "grant minus deduct must land exactly on the net amount");
        });
    }
}
