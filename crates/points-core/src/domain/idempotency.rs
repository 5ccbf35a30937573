use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

/// Row backing the idempotency guard. Primary key is the raw key
/// string itself — there is intentionally no surrogate id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub owner: UserId,
    pub transaction_id: Option<TransactionId>,
    pub status: IdempotencyStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
