use chrono::{DateTime, Utc};
use points_core::{CoreError, PollCursor};
use sqlx::Postgres;

/// Reads the singleton cursor row, or `None` before the poller has ever run.
pub async fn get<'c, E>(executor: E) -> Result<Option<PollCursor>, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let row: Option<(DateTime<Utc>,)> = sqlx::query_as("SELECT last_polled_at FROM poll_cursor WHERE id")
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|(last_polled_at,)| PollCursor { last_polled_at }))
}

/// Upserts the singleton row. Called once per successful poll window from
/// inside the same transaction that persisted the bonuses it unlocked, so a
/// crash mid-window never advances the cursor past work that wasn't
/// committed.
pub async fn advance(tx: &mut sqlx::Transaction<'_, Postgres>, last_polled_at: DateTime<Utc>) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO poll_cursor (id, last_polled_at)
        VALUES (TRUE, $1)
        ON CONFLICT (id) DO UPDATE SET last_polled_at = EXCLUDED.last_polled_at
        "#,
    )
    .bind(last_polled_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
