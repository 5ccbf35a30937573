//! Schema bootstrap.
//!
//! Mirrors how a from-scratch genesis writes its founding state directly
//! rather than through the normal engine path: this runs once, ahead of any
//! interactor, and is the one place the core is allowed to issue DDL.

use points_core::error::CoreError;
use sqlx::PgPool;
use tracing::info;

pub async fn init_schema(pool: &PgPool) -> Result<(), CoreError> {
    info!("applying points-platform schema");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            balance BIGINT NOT NULL CHECK (balance >= 0),
            role TEXT NOT NULL CHECK (role IN ('user', 'admin')),
            version BIGINT NOT NULL DEFAULT 0,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_users_name_match
        ON users (last_name, first_name) WHERE is_active
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id UUID PRIMARY KEY,
            from_user UUID REFERENCES users(id),
            to_user UUID REFERENCES users(id),
            amount BIGINT NOT NULL CHECK (amount > 0),
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            idempotency_key TEXT,
            description TEXT NOT NULL DEFAULT '',
            metadata JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_from_user ON transactions(from_user)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_to_user ON transactions(to_user)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_created_at ON transactions(created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS idempotency_keys (
            key TEXT PRIMARY KEY,
            owner UUID NOT NULL REFERENCES users(id),
            transaction_id UUID REFERENCES transactions(id),
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transfer_requests (
            id UUID PRIMARY KEY,
            from_user UUID NOT NULL REFERENCES users(id),
            to_user UUID NOT NULL REFERENCES users(id),
            amount BIGINT NOT NULL CHECK (amount > 0),
            message TEXT,
            status TEXT NOT NULL,
            idempotency_key TEXT NOT NULL UNIQUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ NOT NULL,
            approved_at TIMESTAMPTZ,
            rejected_at TIMESTAMPTZ,
            cancelled_at TIMESTAMPTZ,
            transaction_id UUID REFERENCES transactions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_transfer_requests_pending_expiry
        ON transfer_requests(expires_at) WHERE status = 'pending'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS qr_tokens (
            id UUID PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            owner UUID NOT NULL REFERENCES users(id),
            kind TEXT NOT NULL,
            amount BIGINT,
            expires_at TIMESTAMPTZ NOT NULL,
            used_at TIMESTAMPTZ,
            used_by UUID REFERENCES users(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS point_batches (
            id UUID PRIMARY KEY,
            owner UUID NOT NULL REFERENCES users(id),
            original_amount BIGINT NOT NULL CHECK (original_amount > 0),
            remaining_amount BIGINT NOT NULL CHECK (remaining_amount >= 0 AND remaining_amount <= original_amount),
            source TEXT NOT NULL,
            source_transaction UUID REFERENCES transactions(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FIFO consumption and the expiry sweeper both scan by (owner, created_at)
    // or (expires_at) respectively — see points-batch.
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_point_batches_owner_fifo
        ON point_batches(owner, created_at ASC) WHERE remaining_amount > 0
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_point_batches_expiry
        ON point_batches(expires_at) WHERE remaining_amount > 0
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_bonuses (
            id UUID PRIMARY KEY,
            owner UUID NOT NULL REFERENCES users(id),
            bonus_date DATE NOT NULL,
            bonus_points BIGINT NOT NULL,
            external_event_id TEXT NOT NULL,
            event_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (owner, bonus_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS system_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Singleton: the poller keeps exactly one cursor row, identified by a
    // fixed key rather than a dedicated one-row table.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS poll_cursor (
            id BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (id),
            last_polled_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS archived_users (
            id UUID PRIMARY KEY,
            username TEXT NOT NULL,
            email TEXT NOT NULL,
            final_balance BIGINT NOT NULL,
            archived_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_change_history (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES users(id),
            field TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            changed_by UUID,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
