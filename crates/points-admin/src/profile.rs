use chrono::{DateTime, Utc};
use points_core::constants::VERSION_CONFLICT_MAX_RETRIES;
use points_core::error::{self_deactivation, unauthorized, version_conflict};
use points_core::{CoreError, Role, User, UserId};
use points_txn::TransactionManager;
use tracing::warn;

async fn require_admin(pool: &sqlx::PgPool, admin: UserId) -> Result<(), CoreError> {
    let admin_user = points_db::repo::users::find_by_id(pool, admin).await?;
    if !admin_user.role.is_admin() {
        return Err(unauthorized(format!("{admin} does not hold the admin role")));
    }
    Ok(())
}

/// Changes `target`'s role and/or active flag via the optimistic-version
/// path: read, write with `WHERE version = expected`, retry on a lost race
/// up to [`VERSION_CONFLICT_MAX_RETRIES`] times. Self-
/// deactivation by an admin is rejected before any read is attempted.
pub async fn set_role_and_active(
    manager: &TransactionManager,
    admin: UserId,
    target: UserId,
    new_role: Role,
    new_active: bool,
    now: DateTime<Utc>,
) -> Result<User, CoreError> {
    require_admin(manager.pool(), admin).await?;
    if admin == target && !new_active {
        return Err(self_deactivation("an admin may not deactivate their own account"));
    }

    for attempt in 0..=VERSION_CONFLICT_MAX_RETRIES {
        let before = points_db::repo::users::find_by_id(manager.pool(), target).await?;
        let changed = points_db::repo::users::update_with_version(
            manager.pool(),
            target,
            before.version,
            new_role,
            new_active,
            now,
        )
        .await?;

        if changed {
            return manager
                .run(move |tx| {
                    Box::pin(async move {
                        points_db::repo::users::record_change(tx, target, "role", Some(&format!("{:?}", before.role)), Some(&format!("{new_role:?}")), Some(admin)).await?;
                        points_db::repo::users::record_change(tx, target, "is_active", Some(&before.is_active.to_string()), Some(&new_active.to_string()), Some(admin)).await?;
                        points_db::repo::users::find_by_id(&mut **tx, target).await
                    })
                })
                .await;
        }

        warn!(%target, attempt, "role/active update lost an optimistic version race, retrying");
    }

    Err(version_conflict(format!("could not update {target} after {VERSION_CONFLICT_MAX_RETRIES} retries")))
}
