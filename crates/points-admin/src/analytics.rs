use chrono::{DateTime, Duration, Utc};
use points_core::error::unauthorized;
use points_core::{CoreError, UserId};
use points_db::repo::analytics::{DailyStat, HolderBalance, MonthlyAggregate, TypeBreakdown};

async fn require_admin(pool: &sqlx::PgPool, admin: UserId) -> Result<(), CoreError> {
    let admin_user = points_db::repo::users::find_by_id(pool, admin).await?;
    if !admin_user.role.is_admin() {
        return Err(unauthorized(format!("{admin} does not hold the admin role")));
    }
    Ok(())
}

/// Highest-balance active accounts, most recent ties broken alphabetically.
pub async fn top_holders(pool: &sqlx::PgPool, admin: UserId, limit: i64) -> Result<Vec<HolderBalance>, CoreError> {
    require_admin(pool, admin).await?;
    points_db::repo::analytics::top_holders(pool, limit).await
}

/// Transaction counts and volume by `kind`, over completed transactions
/// created since `since`.
pub async fn type_breakdown(pool: &sqlx::PgPool, admin: UserId, since: DateTime<Utc>) -> Result<Vec<TypeBreakdown>, CoreError> {
    require_admin(pool, admin).await?;
    points_db::repo::analytics::type_breakdown_since(pool, since).await
}

/// Per-day transaction count and volume over the trailing `days`.
pub async fn daily_stats(pool: &sqlx::PgPool, admin: UserId, days: i64, now: DateTime<Utc>) -> Result<Vec<DailyStat>, CoreError> {
    require_admin(pool, admin).await?;
    points_db::repo::analytics::daily_stats(pool, now - Duration::days(days), now).await
}

/// Per-month transaction count and volume over the trailing `months_back`.
pub async fn monthly_aggregates(pool: &sqlx::PgPool, admin: UserId, months_back: i64) -> Result<Vec<MonthlyAggregate>, CoreError> {
    require_admin(pool, admin).await?;
    points_db::repo::analytics::monthly_aggregates(pool, months_back).await
}
