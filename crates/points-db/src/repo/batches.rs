use chrono::{DateTime, Utc};
use points_core::error::db_error;
use points_core::{BatchSource, CoreError, PointBatch, PointBatchId, TransactionId, UserId};
use sqlx::{FromRow, Postgres};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct PointBatchRow {
    pub id: Uuid,
    pub owner: Uuid,
    pub original_amount: i64,
    pub remaining_amount: i64,
    pub source: String,
    pub source_transaction: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn source_str(source: BatchSource) -> &'static str {
    match source {
        BatchSource::Transfer => "transfer",
        BatchSource::AdminGrant => "admin_grant",
        BatchSource::DailyBonus => "daily_bonus",
        BatchSource::SystemGrant => "system_grant",
        BatchSource::Migration => "migration",
    }
}

impl TryFrom<PointBatchRow> for PointBatch {
    type Error = CoreError;

    fn try_from(row: PointBatchRow) -> Result<Self, Self::Error> {
        let source = match row.source.as_str() {
            "transfer" => BatchSource::Transfer,
            "admin_grant" => BatchSource::AdminGrant,
            "daily_bonus" => BatchSource::DailyBonus,
            "system_grant" => BatchSource::SystemGrant,
            "migration" => BatchSource::Migration,
            other => return Err(db_error(format!("unrecognized point batch source: {other}"))),
        };
        Ok(PointBatch {
            id: PointBatchId::from(row.id),
            owner: UserId::from(row.owner),
            original_amount: row.original_amount,
            remaining_amount: row.remaining_amount,
            source,
            source_transaction: row.source_transaction.map(TransactionId::from),
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

pub async fn insert<'c, E>(executor: E, batch: &PointBatch) -> Result<(), CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO point_batches
            (id, owner, original_amount, remaining_amount, source, source_transaction, created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(batch.id.as_uuid())
    .bind(batch.owner.as_uuid())
    .bind(batch.original_amount)
    .bind(batch.remaining_amount)
    .bind(source_str(batch.source))
    .bind(batch.source_transaction.map(|t| t.as_uuid()))
    .bind(batch.created_at)
    .bind(batch.expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Oldest-first, unexpired, non-empty batches for `owner`, row-locked so two
/// concurrent debits can't both claim the same remaining points.
pub async fn list_spendable_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    owner: UserId,
    now: DateTime<Utc>,
) -> Result<Vec<PointBatch>, CoreError> {
    let rows: Vec<PointBatchRow> = sqlx::query_as(
        r#"
        SELECT * FROM point_batches
        WHERE owner = $1 AND remaining_amount > 0 AND expires_at > $2
        ORDER BY created_at ASC
        FOR UPDATE
        "#,
    )
    .bind(owner.as_uuid())
    .bind(now)
    .fetch_all(&mut **tx)
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

pub async fn decrement_remaining(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: PointBatchId,
    by: i64,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE point_batches SET remaining_amount = remaining_amount - $1 WHERE id = $2 AND remaining_amount >= $1",
    )
    .bind(by)
    .bind(id.as_uuid())
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(db_error(format!("batch {id} did not have {by} remaining to consume")));
    }
    Ok(())
}

/// A page of batches that have points left but expired at or before `now`,
/// for the hourly expiry sweeper.
pub async fn list_expired<'c, E>(executor: E, now: DateTime<Utc>, limit: i64) -> Result<Vec<PointBatch>, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let rows: Vec<PointBatchRow> = sqlx::query_as(
        r#"
        SELECT * FROM point_batches
        WHERE remaining_amount > 0 AND expires_at <= $1
        ORDER BY expires_at ASC
        LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

/// Zeroes out a batch's remaining amount as part of the expiry sweep's unit
/// of work. The caller is responsible for debiting the owner's balance by
/// the same amount inside the same transaction.
pub async fn zero_remaining(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: PointBatchId,
    expected_remaining: i64,
) -> Result<bool, CoreError> {
    let result = sqlx::query("UPDATE point_batches SET remaining_amount = 0 WHERE id = $1 AND remaining_amount = $2")
        .bind(id.as_uuid())
        .bind(expected_remaining)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() == 1)
}
