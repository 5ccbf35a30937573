use chrono::{DateTime, Utc};
use points_core::error::db_error;
use points_core::{CoreError, IdempotencyRecord, IdempotencyStatus, TransactionId, UserId};
use sqlx::{FromRow, Postgres};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct IdempotencyRow {
    pub key: String,
    pub owner: Uuid,
    pub transaction_id: Option<Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn status_str(status: IdempotencyStatus) -> &'static str {
    match status {
        IdempotencyStatus::Processing => "processing",
        IdempotencyStatus::Completed => "completed",
        IdempotencyStatus::Failed => "failed",
    }
}

impl TryFrom<IdempotencyRow> for IdempotencyRecord {
    type Error = CoreError;

    fn try_from(row: IdempotencyRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "processing" => IdempotencyStatus::Processing,
            "completed" => IdempotencyStatus::Completed,
            "failed" => IdempotencyStatus::Failed,
            other => return Err(db_error(format!("unrecognized idempotency status: {other}"))),
        };
        Ok(IdempotencyRecord {
            key: row.key,
            owner: UserId::from(row.owner),
            transaction_id: row.transaction_id.map(TransactionId::from),
            status,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

/// Attempts to claim `key` for `owner` by inserting a `processing` row.
/// Relies on the primary key unique constraint for correctness: a concurrent
/// claim of the same key loses the race at the database, not in application
/// logic.
///
/// Returns `true` if this call won the claim, `false` if a row already
/// exists (caller should then fetch and inspect it).
pub async fn try_claim(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    key: &str,
    owner: UserId,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO idempotency_keys (key, owner, status, created_at, expires_at)
        VALUES ($1, $2, 'processing', $3, $4)
        ON CONFLICT (key) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(owner.as_uuid())
    .bind(now)
    .bind(expires_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find<'c, E>(executor: E, key: &str) -> Result<Option<IdempotencyRecord>, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let row: Option<IdempotencyRow> = sqlx::query_as("SELECT * FROM idempotency_keys WHERE key = $1")
        .bind(key)
        .fetch_optional(executor)
        .await?;
    row.map(TryInto::try_into).transpose()
}

pub async fn find_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    key: &str,
) -> Result<Option<IdempotencyRecord>, CoreError> {
    let row: Option<IdempotencyRow> = sqlx::query_as("SELECT * FROM idempotency_keys WHERE key = $1 FOR UPDATE")
        .bind(key)
        .fetch_optional(&mut **tx)
        .await?;
    row.map(TryInto::try_into).transpose()
}

pub async fn complete(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    key: &str,
    transaction_id: TransactionId,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE idempotency_keys SET status = 'completed', transaction_id = $1 WHERE key = $2")
        .bind(transaction_id.as_uuid())
        .bind(key)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn fail(tx: &mut sqlx::Transaction<'_, Postgres>, key: &str) -> Result<(), CoreError> {
    sqlx::query("UPDATE idempotency_keys SET status = 'failed' WHERE key = $1")
        .bind(key)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Deletes records past their 24h TTL. Run opportunistically by the batch
/// expiry sweeper's tick rather than on its own schedule.
pub async fn delete_expired<'c, E>(executor: E, now: DateTime<Utc>) -> Result<u64, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at < $1")
        .bind(now)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
