//! Read-only aggregate queries backing the admin console. These never
//! take a row lock and never run inside a `TransactionManager` unit of
//! work — they read whatever is currently committed and are free to run
//! concurrently with writers.

use chrono::{DateTime, NaiveDate, Utc};
use points_core::{CoreError, UserId};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct HolderBalance {
    pub id: Uuid,
    pub username: String,
    pub balance: i64,
}

impl HolderBalance {
    pub fn user(&self) -> UserId {
        UserId::from(self.id)
    }
}

pub async fn top_holders(pool: &sqlx::PgPool, limit: i64) -> Result<Vec<HolderBalance>, CoreError> {
    let rows = sqlx::query_as::<_, HolderBalance>(
        r#"
        SELECT id, username, balance FROM users
        WHERE is_active
        ORDER BY balance DESC, username ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone, FromRow)]
pub struct TypeBreakdown {
    pub kind: String,
    pub transaction_count: i64,
    pub total_amount: i64,
}

pub async fn type_breakdown_since(pool: &sqlx::PgPool, since: DateTime<Utc>) -> Result<Vec<TypeBreakdown>, CoreError> {
    let rows = sqlx::query_as::<_, TypeBreakdown>(
        r#"
        SELECT kind, COUNT(*) AS transaction_count, COALESCE(SUM(amount), 0) AS total_amount
        FROM transactions
        WHERE created_at >= $1 AND status = 'completed'
        GROUP BY kind
        ORDER BY kind
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone, FromRow)]
pub struct DailyStat {
    pub day: NaiveDate,
    pub transaction_count: i64,
    pub total_volume: i64,
}

pub async fn daily_stats(pool: &sqlx::PgPool, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<DailyStat>, CoreError> {
    let rows = sqlx::query_as::<_, DailyStat>(
        r#"
        SELECT date_trunc('day', created_at)::date AS day,
               COUNT(*) AS transaction_count,
               COALESCE(SUM(amount), 0) AS total_volume
        FROM transactions
        WHERE created_at >= $1 AND created_at < $2 AND status = 'completed'
        GROUP BY day
        ORDER BY day
        "#,
    )
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone, FromRow)]
pub struct MonthlyAggregate {
    pub month: NaiveDate,
    pub transaction_count: i64,
    pub total_volume: i64,
}

pub async fn monthly_aggregates(pool: &sqlx::PgPool, months_back: i64) -> Result<Vec<MonthlyAggregate>, CoreError> {
    let rows = sqlx::query_as::<_, MonthlyAggregate>(
        r#"
        SELECT date_trunc('month', created_at)::date AS month,
               COUNT(*) AS transaction_count,
               COALESCE(SUM(amount), 0) AS total_volume
        FROM transactions
        WHERE created_at >= date_trunc('month', NOW()) - ($1 || ' months')::interval
          AND status = 'completed'
        GROUP BY month
        ORDER BY month
        "#,
    )
    .bind(months_back)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
