use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// A point-economy account.
///
/// `balance` and `version` are mutated only by the balance engine
/// (`points-balance`); every other field goes through the optimistic-version
/// path. Invariant: `balance >= 0` at every committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Opaque password hash — the core never inspects this; hashing/verifying
    /// is delegated to an injected password-service collaborator.
    pub password_hash: String,
    pub last_name: String,
    pub first_name: String,
    pub balance: i64,
    pub role: Role,
    pub version: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// `last_name + first_name`, the exact concatenation the bonus-matcher's
    /// normalized name index is built from. Kept here rather than in
    /// `points-bonus` because the concatenation rule is a property of the
    /// user record, not the matcher.
    pub fn full_name(&self) -> String {
        format!("{}{}", self.last_name, self.first_name)
    }
}
