use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use points_core::constants::{BATCH_EXPIRY_FETCH_SIZE, BATCH_EXPIRY_SWEEP_INTERVAL_SECS};
use points_core::{CoreError, TimeProvider, TransactionStatus, TransactionType};
use points_txn::TransactionManager;
use tracing::{error, info};

/// Expires one page of past-due batches, crediting an equal `system_expire`
/// debit against each owner so the ledger records why the balance dropped
/// "every debit is traceable to a transaction".
///
/// A single batch might have already been partly consumed since it was
/// listed; `zero_remaining` is conditioned on the remaining amount observed
/// at list time so a racing debit never gets silently overwritten.
async fn sweep_once(manager: &TransactionManager, now: chrono::DateTime<chrono::Utc>) -> Result<usize, CoreError> {
    let expired = points_db::repo::batches::list_expired(manager.pool(), now, BATCH_EXPIRY_FETCH_SIZE).await?;
    let mut swept = 0usize;

    for batch in expired {
        manager
            .run(move |tx| {
                let batch = batch.clone();
                Box::pin(async move {
                    let changed = points_db::repo::batches::zero_remaining(tx, batch.id, batch.remaining_amount).await?;
                    if !changed {
                        // Already consumed or swept by a concurrent run; nothing to do.
                        return Ok(());
                    }
                    points_balance::BalanceEngine::adjust(tx, batch.owner, -batch.remaining_amount, now).await?;

                    let txn = points_core::Transaction {
                        id: points_core::TransactionId::new(),
                        from_user: Some(batch.owner),
                        to_user: None,
                        amount: batch.remaining_amount,
                        kind: TransactionType::SystemExpire,
                        status: TransactionStatus::Completed,
                        idempotency_key: None,
                        description: format!("point batch {} expired", batch.id),
                        metadata: HashMap::new(),
                        created_at: now,
                        completed_at: Some(now),
                    };
                    points_db::repo::transactions::insert(&mut **tx, &txn).await?;
                    Ok(())
                })
            })
            .await?;
        swept += 1;
    }

    Ok(swept)
}

/// Supervising loop: ticks every [`BATCH_EXPIRY_SWEEP_INTERVAL_SECS`], sweeps
/// pages of expired batches until a tick finds none, and logs — rather than
/// propagates — a failed sweep so one bad tick doesn't take the worker down
/// background workers must not abort the process on error.
pub async fn run_expiry_worker(manager: TransactionManager, clock: Arc<dyn TimeProvider>) {
    let mut ticker = tokio::time::interval(StdDuration::from_secs(BATCH_EXPIRY_SWEEP_INTERVAL_SECS));
    loop {
        ticker.tick().await;
        let now = clock.now();
        loop {
            match sweep_once(&manager, now).await {
                Ok(0) => break,
                Ok(swept) => info!(swept, "expired point batches swept"),
                Err(err) => {
                    error!(error = %err, "point batch expiry sweep failed");
                    break;
                }
            }
        }

        match points_idempotency::sweep_expired(manager.pool(), now).await {
            Ok(deleted) if deleted > 0 => info!(deleted, "expired idempotency keys swept"),
            Ok(_) => {}
            Err(err) => error!(error = %err, "idempotency key sweep failed"),
        }
    }
}
