use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{QrTokenId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrTokenKind {
    /// Scanning this token triggers scanner → owner.
    Receive,
    /// Scanning this token triggers owner → scanner.
    Send,
}

/// A single-use token that initiates a direct transfer when scanned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrToken {
    pub id: QrTokenId,
    pub code: String,
    pub owner: UserId,
    pub kind: QrTokenKind,
    /// `None` means "scanner chooses the amount". `send` tokens must carry
    /// `Some(positive)` — enforced at creation, not at scan time.
    pub amount: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl QrToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }
}
