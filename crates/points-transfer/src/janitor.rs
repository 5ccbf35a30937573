use std::sync::Arc;
use std::time::Duration as StdDuration;

use points_core::TimeProvider;
use points_txn::TransactionManager;
use tracing::{error, info};

/// Expires one page of past-due pending requests. No points have
/// moved for a pending request, so expiry is a plain status flip — no
/// balance or batch engine involvement, unlike the batch sweeper.
const JANITOR_FETCH_SIZE: i64 = 100;
const JANITOR_TICK_SECS: u64 = 300;

async fn sweep_once(manager: &TransactionManager, now: chrono::DateTime<chrono::Utc>) -> Result<usize, points_core::CoreError> {
    let expired = points_db::repo::transfer_requests::list_expired_pending(manager.pool(), now, JANITOR_FETCH_SIZE).await?;
    let mut swept = 0usize;
    for request in expired {
        let changed = points_db::repo::transfer_requests::expire(manager.pool(), request.id, now).await?;
        if changed {
            swept += 1;
        }
    }
    Ok(swept)
}

pub async fn run_request_expiry_worker(manager: TransactionManager, clock: Arc<dyn TimeProvider>) {
    let mut ticker = tokio::time::interval(StdDuration::from_secs(JANITOR_TICK_SECS));
    loop {
        ticker.tick().await;
        let now = clock.now();
        loop {
            match sweep_once(&manager, now).await {
                Ok(0) => break,
                Ok(swept) => info!(swept, "expired transfer requests swept"),
                Err(err) => {
                    error!(error = %err, "transfer request expiry sweep failed");
                    break;
                }
            }
        }
    }
}
