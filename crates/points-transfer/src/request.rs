use std::collections::HashMap;

use chrono::{DateTime, Utc};
use points_batch::BatchEngine;
use points_core::constants::transfer_request_ttl;
use points_core::error::{invalid_amount, invalid_state, request_expired, same_user, unauthorized, user_inactive};
use points_core::{
    BatchSource, CoreError, TransactionStatus, TransactionType, TransferRequest, TransferRequestId,
    TransferRequestStatus, UserId,
};
use points_txn::TransactionManager;

/// Creates a pending request awaiting the recipient's decision. The
/// idempotency key here is the request's own primary key, not a guard around
/// a balance mutation — nothing moves until `approve` runs.
pub async fn create_request(
    manager: &TransactionManager,
    idempotency_key: String,
    from: UserId,
    to: UserId,
    amount: i64,
    message: Option<String>,
    now: DateTime<Utc>,
) -> Result<TransferRequest, CoreError> {
    if from == to {
        return Err(same_user(format!("cannot request a transfer from {from} to itself")));
    }
    if amount <= 0 {
        return Err(invalid_amount(format!("transfer request amount must be positive, got {amount}")));
    }

    let request = TransferRequest {
        id: TransferRequestId::new(),
        from_user: from,
        to_user: to,
        amount,
        message,
        status: TransferRequestStatus::Pending,
        idempotency_key,
        created_at: now,
        expires_at: now + transfer_request_ttl(),
        approved_at: None,
        rejected_at: None,
        cancelled_at: None,
        transaction_id: None,
    };

    manager
        .run(move |tx| {
            let request = request.clone();
            Box::pin(async move {
                points_db::repo::transfer_requests::insert(&mut **tx, &request).await?;
                Ok(request)
            })
        })
        .await
}

/// Recipient accepts: moves the points and marks the request `approved`, all
/// in one transaction. Rejects anything but a still-pending, unexpired
/// request so a late approval can never race an expiry sweep.
pub async fn approve_request(
    manager: &TransactionManager,
    request_id: TransferRequestId,
    approving_user: UserId,
    now: DateTime<Utc>,
) -> Result<TransferRequest, CoreError> {
    manager
        .run(move |tx| {
            Box::pin(async move {
                let request = points_db::repo::transfer_requests::find_by_id_for_update(tx, request_id).await?;
                if request.to_user != approving_user {
                    return Err(unauthorized(format!("{approving_user} may not approve a request addressed to {}", request.to_user)));
                }
                if request.status != TransferRequestStatus::Pending {
                    return Err(invalid_state(format!("request {request_id} is not pending")));
                }
                if request.is_expired(now) {
                    return Err(request_expired(format!("request {request_id} expired at {}", request.expires_at)));
                }

                // Lock both accounts in ascending user-id order, never in
                // caller-supplied order, so a concurrent approval of A→B and
                // B→A requests can never deadlock on each other's row locks.
                let (first_id, second_id) = if request.from_user <= request.to_user {
                    (request.from_user, request.to_user)
                } else {
                    (request.to_user, request.from_user)
                };
                let first = points_db::repo::users::find_by_id_for_update(tx, first_id).await?;
                let second = points_db::repo::users::find_by_id_for_update(tx, second_id).await?;
                let (sender, recipient) = if request.from_user == first_id {
                    (first, second)
                } else {
                    (second, first)
                };
                if !sender.is_active {
                    return Err(user_inactive(format!("sender {} is deactivated", request.from_user)));
                }
                if !recipient.is_active {
                    return Err(user_inactive(format!("recipient {} is deactivated", request.to_user)));
                }

                let txn_id = points_core::TransactionId::new();
                BatchEngine::debit(tx, request.from_user, request.amount, now).await?;
                BatchEngine::credit(tx, request.to_user, request.amount, BatchSource::Transfer, Some(txn_id), now).await?;

                let txn = points_core::Transaction {
                    id: txn_id,
                    from_user: Some(request.from_user),
                    to_user: Some(request.to_user),
                    amount: request.amount,
                    kind: TransactionType::Transfer,
                    status: TransactionStatus::Completed,
                    idempotency_key: Some(request.idempotency_key.clone()),
                    description: request.message.clone().unwrap_or_default(),
                    metadata: HashMap::new(),
                    created_at: now,
                    completed_at: Some(now),
                };
                points_db::repo::transactions::insert(&mut **tx, &txn).await?;

                let transitioned = points_db::repo::transfer_requests::approve(tx, request_id, now, txn_id).await?;
                if !transitioned {
                    return Err(invalid_state(format!("request {request_id} changed state concurrently")));
                }

                points_db::repo::transfer_requests::find_by_id(&mut **tx, request_id).await
            })
        })
        .await
}

pub async fn reject_request(
    manager: &TransactionManager,
    request_id: TransferRequestId,
    rejecting_user: UserId,
    now: DateTime<Utc>,
) -> Result<TransferRequest, CoreError> {
    manager
        .run(move |tx| {
            Box::pin(async move {
                let request = points_db::repo::transfer_requests::find_by_id_for_update(tx, request_id).await?;
                if request.to_user != rejecting_user {
                    return Err(unauthorized(format!("{rejecting_user} may not reject a request addressed to {}", request.to_user)));
                }
                if request.status != TransferRequestStatus::Pending {
                    return Err(invalid_state(format!("request {request_id} is not pending")));
                }
                let transitioned = points_db::repo::transfer_requests::reject(tx, request_id, now).await?;
                if !transitioned {
                    return Err(invalid_state(format!("request {request_id} changed state concurrently")));
                }
                points_db::repo::transfer_requests::find_by_id(&mut **tx, request_id).await
            })
        })
        .await
}

pub async fn cancel_request(
    manager: &TransactionManager,
    request_id: TransferRequestId,
    cancelling_user: UserId,
    now: DateTime<Utc>,
) -> Result<TransferRequest, CoreError> {
    manager
        .run(move |tx| {
            Box::pin(async move {
                let request = points_db::repo::transfer_requests::find_by_id_for_update(tx, request_id).await?;
                if request.from_user != cancelling_user {
                    return Err(unauthorized(format!("{cancelling_user} may not cancel a request filed by {}", request.from_user)));
                }
                if request.status != TransferRequestStatus::Pending {
                    return Err(invalid_state(format!("request {request_id} is not pending")));
                }
                let transitioned = points_db::repo::transfer_requests::cancel(tx, request_id, now).await?;
                if !transitioned {
                    return Err(invalid_state(format!("request {request_id} changed state concurrently")));
                }
                points_db::repo::transfer_requests::find_by_id(&mut **tx, request_id).await
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

    fn new_user(balance: i64, now: DateTime<Utc>) -> points_core::User {
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
    fn an_approved_request_moves_points_once_and_cannot_transition_again() {
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
            let request = create_request(&manager, "req-1".to_string(), alice.id, bob.id, 25, None, now).await.expect("create");
            assert_eq!(request.status, TransferRequestStatus::Pending);

            let approved = approve_request(&manager, request.id, bob.id, now).await.expect("approve");
            assert_eq!(approved.status, TransferRequestStatus::Approved);

            let alice_after = points_db::repo::users::find_by_id(&pool, alice.id).await.unwrap();
            let bob_after = points_db::repo::users::find_by_id(&pool, bob.id).await.unwrap();
            assert_eq!(alice_after.balance, 75);
            assert_eq!(bob_after.balance, 25);

            let second = approve_request(&manager, request.id, bob.id, now).await.unwrap_err();
            assert_eq!(second.kind(), points_core::ErrorKind::InvalidState);

            let alice_final = points_db::repo::users::find_by_id(&pool, alice.id).await.unwrap();
            assert_eq!(alice_final.balance, 75, "a second approval attempt must not move points again");
        });
    }

    #[test]
    fn a_rejected_request_moves_nothing_and_a_cancel_after_reject_is_invalid_state() {
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
            let request = create_request(&manager, "req-2".to_string(), alice.id, bob.id, 25, None, now).await.expect("create");

            let rejected = reject_request(&manager, request.id, bob.id, now).await.expect("reject");
            assert_eq!(rejected.status, TransferRequestStatus::Rejected);

            let alice_after = points_db::repo::users::find_by_id(&pool, alice.id).await.unwrap();
            assert_eq!(alice_after.balance, 100, "a rejected request must never move points");

            let err = cancel_request(&manager, request.id, alice.id, now).await.unwrap_err();
            assert_eq!(err.kind(), points_core::ErrorKind::InvalidState);
        });
    }
}
