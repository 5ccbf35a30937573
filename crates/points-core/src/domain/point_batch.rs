use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PointBatchId, TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSource {
    Transfer,
    AdminGrant,
    DailyBonus,
    SystemGrant,
    Migration,
}

/// A single credit's worth of points, consumed strictly oldest-first on debit
///. `remaining_amount` is the only field balance-relevant debits touch;
/// `original_amount` never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointBatch {
    pub id: PointBatchId,
    pub owner: UserId,
    pub original_amount: i64,
    pub remaining_amount: i64,
    pub source: BatchSource,
    pub source_transaction: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PointBatch {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_spendable(&self, now: DateTime<Utc>) -> bool {
        self.remaining_amount > 0 && !self.is_expired(now)
    }
}
