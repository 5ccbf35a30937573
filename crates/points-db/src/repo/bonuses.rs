use chrono::{DateTime, NaiveDate, Utc};
use points_core::{CoreError, DailyBonus, DailyBonusId, UserId};
use sqlx::{FromRow, Postgres};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct DailyBonusRow {
    pub id: Uuid,
    pub owner: Uuid,
    pub bonus_date: NaiveDate,
    pub bonus_points: i64,
    pub external_event_id: String,
    pub event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<DailyBonusRow> for DailyBonus {
    fn from(row: DailyBonusRow) -> Self {
        DailyBonus {
            id: DailyBonusId::from(row.id),
            owner: UserId::from(row.owner),
            bonus_date: row.bonus_date,
            bonus_points: row.bonus_points,
            external_event_id: row.external_event_id,
            event_at: row.event_at,
            created_at: row.created_at,
        }
    }
}

/// Inserts the bonus row, relying on the `(owner, bonus_date)` unique index
/// to reject a second bonus for the same logical day. Returns
/// `false` rather than erroring when the constraint fires, so the caller can
/// treat "already granted today" as an expected outcome.
pub async fn try_insert(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    bonus: &DailyBonus,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO daily_bonuses (id, owner, bonus_date, bonus_points, external_event_id, event_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (owner, bonus_date) DO NOTHING
        "#,
    )
    .bind(bonus.id.as_uuid())
    .bind(bonus.owner.as_uuid())
    .bind(bonus.bonus_date)
    .bind(bonus.bonus_points)
    .bind(&bonus.external_event_id)
    .bind(bonus.event_at)
    .bind(bonus.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn has_received<'c, E>(executor: E, owner: UserId, bonus_date: NaiveDate) -> Result<bool, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM daily_bonuses WHERE owner = $1 AND bonus_date = $2)",
    )
    .bind(owner.as_uuid())
    .bind(bonus_date)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}
