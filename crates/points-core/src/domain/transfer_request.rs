use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TransactionId, TransferRequestId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferRequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Expired,
}

impl TransferRequestStatus {
    /// A terminal status is written once and never overwritten "no
    /// committed request occupies two terminal states".
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransferRequestStatus::Pending)
    }
}

/// An asynchronous, two-phase transfer awaiting the receiver's decision
///. Owned by the sender for creation/cancel, by the receiver for
/// approve/reject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub id: TransferRequestId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub amount: i64,
    pub message: Option<String>,
    pub status: TransferRequestStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<TransactionId>,
}

impl TransferRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
