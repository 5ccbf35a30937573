//! Time abstraction and the logical-day calculation used by the daily-bonus
//! engine. Keeping `now()` behind a trait — rather than calling
//! `Utc::now()` directly from engine code — is what makes the expiry and
//! bonus-cutover tests deterministic.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

use crate::constants::{DEFAULT_BONUS_CUTOVER_HOUR, DEFAULT_BONUS_TIMEZONE};

/// Injected wall-clock source. Production wires `SystemTimeProvider`; tests
/// wire a fixed or steppable clock so expiry/bonus-cutover scenarios (/// scenarios 6-8) don't need real sleeps.
pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns a fixed instant, settable by tests.
#[derive(Debug, Clone)]
pub struct FixedTimeProvider(std::sync::Arc<std::sync::RwLock<DateTime<Utc>>>);

impl FixedTimeProvider {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(std::sync::Arc::new(std::sync::RwLock::new(at)))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.write().expect("fixed clock lock poisoned") = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.0.write().expect("fixed clock lock poisoned");
        *guard = *guard + by;
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.0.read().expect("fixed clock lock poisoned")
    }
}

/// Policy for converting an instant to a "logical day": a fixed zone plus a
/// cutover hour before which an event attributes to the previous calendar
/// date. `(user, bonus_date)` uniqueness is computed against this value.
#[derive(Debug, Clone, Copy)]
pub struct LogicalDayPolicy {
    pub zone: Tz,
    pub cutover_hour: u32,
}

impl Default for LogicalDayPolicy {
    fn default() -> Self {
        Self { zone: DEFAULT_BONUS_TIMEZONE, cutover_hour: DEFAULT_BONUS_CUTOVER_HOUR }
    }
}

impl LogicalDayPolicy {
    pub fn logical_day(&self, at: DateTime<Utc>) -> NaiveDate {
        let local = at.with_timezone(&self.zone);
        if local.naive_local().time().hour() < self.cutover_hour {
            local.date_naive() - chrono::Duration::days(1)
        } else {
            local.date_naive()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn before_cutover_attributes_to_previous_day() {
        let policy = LogicalDayPolicy::default();
        // 2026-07-28 05:59 JST == 2026-07-27 20:59 UTC
        let at = Utc.with_ymd_and_hms(2026, 7, 27, 20, 59, 0).unwrap();
        assert_eq!(policy.logical_day(at), NaiveDate::from_ymd_opt(2026, 7, 27).unwrap());
    }

    #[test]
    fn at_cutover_attributes_to_same_day() {
        let policy = LogicalDayPolicy::default();
        // 2026-07-28 06:00 JST == 2026-07-27 21:00 UTC
        let at = Utc.with_ymd_and_hms(2026, 7, 27, 21, 0, 0).unwrap();
        assert_eq!(policy.logical_day(at), NaiveDate::from_ymd_opt(2026, 7, 28).unwrap());
    }

    #[test]
    fn fixed_provider_advances() {
        let clock = FixedTimeProvider::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        clock.advance(chrono::Duration::days(90));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
    }
}
