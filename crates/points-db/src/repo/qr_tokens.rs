use chrono::{DateTime, Utc};
use points_core::error::{db_error, qr_not_found};
use points_core::{CoreError, QrToken, QrTokenId, QrTokenKind, UserId};
use sqlx::{FromRow, Postgres};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct QrTokenRow {
    pub id: Uuid,
    pub code: String,
    pub owner: Uuid,
    pub kind: String,
    pub amount: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

fn kind_str(kind: QrTokenKind) -> &'static str {
    match kind {
        QrTokenKind::Receive => "receive",
        QrTokenKind::Send => "send",
    }
}

impl TryFrom<QrTokenRow> for QrToken {
    type Error = CoreError;

    fn try_from(row: QrTokenRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "receive" => QrTokenKind::Receive,
            "send" => QrTokenKind::Send,
            other => return Err(db_error(format!("unrecognized qr token kind: {other}"))),
        };
        Ok(QrToken {
            id: QrTokenId::from(row.id),
            code: row.code,
            owner: UserId::from(row.owner),
            kind,
            amount: row.amount,
            expires_at: row.expires_at,
            used_at: row.used_at,
            used_by: row.used_by.map(UserId::from),
            created_at: row.created_at,
        })
    }
}

pub async fn insert<'c, E>(executor: E, token: &QrToken) -> Result<(), CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO qr_tokens (id, code, owner, kind, amount, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(token.id.as_uuid())
    .bind(&token.code)
    .bind(token.owner.as_uuid())
    .bind(kind_str(token.kind))
    .bind(token.amount)
    .bind(token.expires_at)
    .bind(token.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_by_code_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    code: &str,
) -> Result<QrToken, CoreError> {
    let row: Option<QrTokenRow> = sqlx::query_as("SELECT * FROM qr_tokens WHERE code = $1 FOR UPDATE")
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;
    row.ok_or_else(|| qr_not_found(format!("no qr token with code {code}")))?.try_into()
}

pub async fn mark_used(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: QrTokenId,
    used_by: UserId,
    used_at: DateTime<Utc>,
) -> Result<bool, CoreError> {
    let result = sqlx::query("UPDATE qr_tokens SET used_at = $1, used_by = $2 WHERE id = $3 AND used_at IS NULL")
        .bind(used_at)
        .bind(used_by.as_uuid())
        .bind(id.as_uuid())
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected() == 1)
}
