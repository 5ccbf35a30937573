use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Transfer,
    AdminGrant,
    AdminDeduct,
    SystemGrant,
    SystemExpire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

/// An append-only ledger entry. `system_expire` and `admin_deduct` are
/// both shaped `from_user = Some, to_user = None` — requires callers to
/// distinguish them strictly by `kind`, never by the null pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub from_user: Option<UserId>,
    pub to_user: Option<UserId>,
    pub amount: i64,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub idempotency_key: Option<String>,
    pub description: String,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// A completed transaction never mutates again (invariant). Anything
    /// that would write to one is a programming error, not a recoverable
    /// runtime condition — callers should construct a fresh row instead.
    pub fn is_immutable(&self) -> bool {
        matches!(self.status, TransactionStatus::Completed)
    }
}
