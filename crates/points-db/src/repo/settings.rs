use chrono::{DateTime, Utc};
use points_core::CoreError;

/// Reads a `system_settings` value, falling back to `default` when the key is
/// absent. Callers (the bonus engine's points-per-day lookup, mainly) decide
/// how to parse the string.
pub async fn get<'c, E>(executor: E, key: &str) -> Result<Option<String>, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let value: Option<(String,)> = sqlx::query_as("SELECT value FROM system_settings WHERE key = $1")
        .bind(key)
        .fetch_optional(executor)
        .await?;
    Ok(value.map(|(v,)| v))
}

pub async fn set<'c, E>(executor: E, key: &str, value: &str, now: DateTime<Utc>) -> Result<(), CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO system_settings (key, value, updated_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}
