use chrono::{DateTime, Utc};
use points_core::error::{db_error, request_not_found};
use points_core::{CoreError, TransactionId, TransferRequest, TransferRequestId, TransferRequestStatus, UserId};
use sqlx::{FromRow, Postgres};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct TransferRequestRow {
    pub id: Uuid,
    pub from_user: Uuid,
    pub to_user: Uuid,
    pub amount: i64,
    pub message: Option<String>,
    pub status: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<Uuid>,
}

fn status_str(status: TransferRequestStatus) -> &'static str {
    match status {
        TransferRequestStatus::Pending => "pending",
        TransferRequestStatus::Approved => "approved",
        TransferRequestStatus::Rejected => "rejected",
        TransferRequestStatus::Cancelled => "cancelled",
        TransferRequestStatus::Expired => "expired",
    }
}

impl TryFrom<TransferRequestRow> for TransferRequest {
    type Error = CoreError;

    fn try_from(row: TransferRequestRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "pending" => TransferRequestStatus::Pending,
            "approved" => TransferRequestStatus::Approved,
            "rejected" => TransferRequestStatus::Rejected,
            "cancelled" => TransferRequestStatus::Cancelled,
            "expired" => TransferRequestStatus::Expired,
            other => return Err(db_error(format!("unrecognized transfer request status: {other}"))),
        };
        Ok(TransferRequest {
            id: TransferRequestId::from(row.id),
            from_user: UserId::from(row.from_user),
            to_user: UserId::from(row.to_user),
            amount: row.amount,
            message: row.message,
            status,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
            expires_at: row.expires_at,
            approved_at: row.approved_at,
            rejected_at: row.rejected_at,
            cancelled_at: row.cancelled_at,
            transaction_id: row.transaction_id.map(TransactionId::from),
        })
    }
}

pub async fn insert<'c, E>(executor: E, req: &TransferRequest) -> Result<(), CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO transfer_requests
            (id, from_user, to_user, amount, message, status, idempotency_key, created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(req.id.as_uuid())
    .bind(req.from_user.as_uuid())
    .bind(req.to_user.as_uuid())
    .bind(req.amount)
    .bind(&req.message)
    .bind(status_str(req.status))
    .bind(&req.idempotency_key)
    .bind(req.created_at)
    .bind(req.expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_by_id<'c, E>(executor: E, id: TransferRequestId) -> Result<TransferRequest, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let row: Option<TransferRequestRow> = sqlx::query_as("SELECT * FROM transfer_requests WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(executor)
        .await?;
    row.ok_or_else(|| request_not_found(format!("transfer request {id} not found")))?.try_into()
}

pub async fn find_by_id_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: TransferRequestId,
) -> Result<TransferRequest, CoreError> {
    let row: Option<TransferRequestRow> =
        sqlx::query_as("SELECT * FROM transfer_requests WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;
    row.ok_or_else(|| request_not_found(format!("transfer request {id} not found")))?.try_into()
}

pub async fn list_pending_for_user<'c, E>(executor: E, user: UserId) -> Result<Vec<TransferRequest>, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let rows: Vec<TransferRequestRow> = sqlx::query_as(
        r#"
        SELECT * FROM transfer_requests
        WHERE (from_user = $1 OR to_user = $1) AND status = 'pending'
        ORDER BY created_at ASC
        "#,
    )
    .bind(user.as_uuid())
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

/// Pulled by the janitor worker in small batches, oldest-first.
pub async fn list_expired_pending<'c, E>(executor: E, now: DateTime<Utc>, limit: i64) -> Result<Vec<TransferRequest>, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let rows: Vec<TransferRequestRow> = sqlx::query_as(
        r#"
        SELECT * FROM transfer_requests
        WHERE status = 'pending' AND expires_at <= $1
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

async fn transition(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: TransferRequestId,
    from_status: &str,
    to_status: &str,
    timestamp_column: &str,
    at: DateTime<Utc>,
    transaction_id: Option<TransactionId>,
) -> Result<bool, CoreError> {
    let query = format!(
        "UPDATE transfer_requests SET status = $1, {timestamp_column} = $2, transaction_id = $3 WHERE id = $4 AND status = $5"
    );
    let result = sqlx::query(&query)
        .bind(to_status)
        .bind(at)
        .bind(transaction_id.map(|t| t.as_uuid()))
        .bind(id.as_uuid())
        .bind(from_status)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn approve(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: TransferRequestId,
    at: DateTime<Utc>,
    transaction_id: TransactionId,
) -> Result<bool, CoreError> {
    transition(tx, id, "pending", "approved", "approved_at", at, Some(transaction_id)).await
}

pub async fn reject(tx: &mut sqlx::Transaction<'_, Postgres>, id: TransferRequestId, at: DateTime<Utc>) -> Result<bool, CoreError> {
    transition(tx, id, "pending", "rejected", "rejected_at", at, None).await
}

pub async fn cancel(tx: &mut sqlx::Transaction<'_, Postgres>, id: TransferRequestId, at: DateTime<Utc>) -> Result<bool, CoreError> {
    transition(tx, id, "pending", "cancelled", "cancelled_at", at, None).await
}

pub async fn expire<'c, E>(executor: E, id: TransferRequestId, at: DateTime<Utc>) -> Result<bool, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let result = sqlx::query(
        "UPDATE transfer_requests SET status = 'expired' WHERE id = $1 AND status = 'pending' AND expires_at <= $2",
    )
    .bind(id.as_uuid())
    .bind(at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}
