//! Daily-bonus matching and granting.

pub mod engine;
pub mod matcher;

pub use engine::{bonus_points_per_day, grant_daily_bonus, MatchedAccessEvent};
pub use matcher::{normalize_name, NameIndex};
