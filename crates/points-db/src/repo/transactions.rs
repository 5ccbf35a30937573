use std::collections::HashMap;

use chrono::{DateTime, Utc};
use points_core::error::{db_error, transaction_not_found};
use points_core::{CoreError, Transaction, TransactionId, TransactionStatus, TransactionType, UserId};
use sqlx::{FromRow, Postgres};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub from_user: Option<Uuid>,
    pub to_user: Option<Uuid>,
    pub amount: i64,
    pub kind: String,
    pub status: String,
    pub idempotency_key: Option<String>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn kind_str(kind: TransactionType) -> &'static str {
    match kind {
        TransactionType::Transfer => "transfer",
        TransactionType::AdminGrant => "admin_grant",
        TransactionType::AdminDeduct => "admin_deduct",
        TransactionType::SystemGrant => "system_grant",
        TransactionType::SystemExpire => "system_expire",
    }
}

fn status_str(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Pending => "pending",
        TransactionStatus::Completed => "completed",
        TransactionStatus::Failed => "failed",
        TransactionStatus::Reversed => "reversed",
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = CoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "transfer" => TransactionType::Transfer,
            "admin_grant" => TransactionType::AdminGrant,
            "admin_deduct" => TransactionType::AdminDeduct,
            "system_grant" => TransactionType::SystemGrant,
            "system_expire" => TransactionType::SystemExpire,
            other => return Err(db_error(format!("unrecognized transaction kind: {other}"))),
        };
        let status = match row.status.as_str() {
            "pending" => TransactionStatus::Pending,
            "completed" => TransactionStatus::Completed,
            "failed" => TransactionStatus::Failed,
            "reversed" => TransactionStatus::Reversed,
            other => return Err(db_error(format!("unrecognized transaction status: {other}"))),
        };
        let metadata: HashMap<String, String> =
            serde_json::from_value(row.metadata).map_err(|e| db_error(format!("decoding transaction metadata: {e}")))?;
        Ok(Transaction {
            id: TransactionId::from(row.id),
            from_user: row.from_user.map(UserId::from),
            to_user: row.to_user.map(UserId::from),
            amount: row.amount,
            kind,
            status,
            idempotency_key: row.idempotency_key,
            description: row.description,
            metadata,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

pub async fn insert<'c, E>(executor: E, txn: &Transaction) -> Result<(), CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let metadata = serde_json::to_value(&txn.metadata).map_err(|e| db_error(format!("encoding transaction metadata: {e}")))?;
    sqlx::query(
        r#"
        INSERT INTO transactions
            (id, from_user, to_user, amount, kind, status, idempotency_key, description, metadata, created_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(txn.id.as_uuid())
    .bind(txn.from_user.map(|u| u.as_uuid()))
    .bind(txn.to_user.map(|u| u.as_uuid()))
    .bind(txn.amount)
    .bind(kind_str(txn.kind))
    .bind(status_str(txn.status))
    .bind(&txn.idempotency_key)
    .bind(&txn.description)
    .bind(metadata)
    .bind(txn.created_at)
    .bind(txn.completed_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_by_id<'c, E>(executor: E, id: TransactionId) -> Result<Transaction, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let row: Option<TransactionRow> = sqlx::query_as("SELECT * FROM transactions WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(executor)
        .await?;
    row.ok_or_else(|| transaction_not_found(format!("transaction {id} not found")))?.try_into()
}

pub async fn list_for_user<'c, E>(executor: E, user: UserId, limit: i64, offset: i64) -> Result<Vec<Transaction>, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let rows: Vec<TransactionRow> = sqlx::query_as(
        r#"
        SELECT * FROM transactions
        WHERE from_user = $1 OR to_user = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.as_uuid())
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

pub async fn mark_completed(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: TransactionId,
    completed_at: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE transactions SET status = 'completed', completed_at = $1 WHERE id = $2")
        .bind(completed_at)
        .bind(id.as_uuid())
        .execute(&mut **tx)
        .await?;
    Ok(())
}
