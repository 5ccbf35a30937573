use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DailyBonusId, UserId};

/// Records that `user` has already received the daily bonus for `bonus_date`
///. The `(user, bonus_date)` unique constraint in `points-db` is the
/// correctness guarantee for at-most-one-per-day, not this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBonus {
    pub id: DailyBonusId,
    pub owner: UserId,
    pub bonus_date: NaiveDate,
    pub bonus_points: i64,
    pub external_event_id: String,
    pub event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
