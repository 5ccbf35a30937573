use chrono::{DateTime, Utc};
use points_core::error::{db_error, invalid_role, user_not_found};
use points_core::{CoreError, Role, User, UserId};
use sqlx::{FromRow, Postgres};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub last_name: String,
    pub first_name: String,
    pub balance: i64,
    pub role: String,
    pub version: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = CoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = match row.role.as_str() {
            "user" => Role::User,
            "admin" => Role::Admin,
            other => return Err(invalid_role(format!("unrecognized role column value: {other}"))),
        };
        Ok(User {
            id: UserId::from(row.id),
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            last_name: row.last_name,
            first_name: row.first_name,
            balance: row.balance,
            role,
            version: row.version,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Admin => "admin",
    }
}

pub async fn insert<'c, E>(executor: E, user: &User) -> Result<(), CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO users
            (id, username, email, password_hash, last_name, first_name, balance, role, version, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(user.id.as_uuid())
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.last_name)
    .bind(&user.first_name)
    .bind(user.balance)
    .bind(role_str(user.role))
    .bind(user.version)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_by_id<'c, E>(executor: E, id: UserId) -> Result<User, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(executor)
        .await?;
    row.ok_or_else(|| user_not_found(format!("user {id} not found")))?.try_into()
}

/// Row-locking variant for the balance engine's ordered-acquisition path
///. Must only be called inside an open transaction.
pub async fn find_by_id_for_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: UserId,
) -> Result<User, CoreError> {
    let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;
    row.ok_or_else(|| user_not_found(format!("user {id} not found")))?.try_into()
}

pub async fn find_by_username<'c, E>(executor: E, username: &str) -> Result<Option<User>, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(executor)
        .await?;
    row.map(TryInto::try_into).transpose()
}

/// All active users, for the bonus matcher's name index.
pub async fn list_active<'c, E>(executor: E) -> Result<Vec<User>, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users WHERE is_active")
        .fetch_all(executor)
        .await?;
    rows.into_iter().map(TryInto::try_into).collect()
}

/// Unconditional balance write used only by the balance engine, which has
/// already computed and validated the new value under a held row lock.
pub async fn set_balance(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: UserId,
    new_balance: i64,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE users SET balance = $1, version = version + 1, updated_at = $2 WHERE id = $3",
    )
    .bind(new_balance)
    .bind(now)
    .bind(id.as_uuid())
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(user_not_found(format!("user {id} not found")));
    }
    Ok(())
}

/// Optimistic compare-and-swap used by admin profile mutations.
/// Returns `false` on a version mismatch so the caller can retry or surface
/// `VERSION_CONFLICT`.
pub async fn update_with_version<'c, E>(
    executor: E,
    id: UserId,
    expected_version: i64,
    role: Role,
    is_active: bool,
    now: DateTime<Utc>,
) -> Result<bool, CoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let result = sqlx::query(
        r#"
        UPDATE users
        SET role = $1, is_active = $2, version = version + 1, updated_at = $3
        WHERE id = $4 AND version = $5
        "#,
    )
    .bind(role_str(role))
    .bind(is_active)
    .bind(now)
    .bind(id.as_uuid())
    .bind(expected_version)
    .execute(executor)
    .await
    .map_err(|e| db_error(format!("updating user {id}: {e}")))?;
    Ok(result.rows_affected() == 1)
}

pub async fn archive_and_delete(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user: &User,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO archived_users (id, username, email, final_balance, archived_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user.id.as_uuid())
    .bind(&user.username)
    .bind(&user.email)
    .bind(user.balance)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn record_change(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user_id: UserId,
    field: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    changed_by: Option<UserId>,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO user_change_history (user_id, field, old_value, new_value, changed_by)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id.as_uuid())
    .bind(field)
    .bind(old_value)
    .bind(new_value)
    .bind(changed_by.map(|u| u.as_uuid()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}
