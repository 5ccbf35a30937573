use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Singleton system setting advanced monotonically by the access poller
///. There is exactly one row, keyed implicitly by the table itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollCursor {
    pub last_polled_at: DateTime<Utc>,
}
