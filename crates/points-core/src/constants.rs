//! ─── Points Platform Constants ──────────────────────────────────────────────
//!
//! Tunables for the point economy's engines. Nothing here is load-bearing for
//! correctness on its own — the invariants live in the engines — but changing
//! one of these changes observable behavior, so they're centralized.

use chrono::Duration;

// ── Idempotency ────────────────────────────────────────────────────

/// Idempotency records and transfer requests both expire 24h after creation.
pub const IDEMPOTENCY_KEY_TTL_HOURS: i64 = 24;
pub const TRANSFER_REQUEST_TTL_HOURS: i64 = 24;

pub fn idempotency_key_ttl() -> Duration {
    Duration::hours(IDEMPOTENCY_KEY_TTL_HOURS)
}

pub fn transfer_request_ttl() -> Duration {
    Duration::hours(TRANSFER_REQUEST_TTL_HOURS)
}

// ── Point batches ──────────────────────────────────────────────────────

/// A batch's lifetime from creation: three calendar months.
pub const BATCH_LIFETIME_MONTHS: i32 = 3;

/// Expiry sweeper cadence and per-cycle page size.
pub const BATCH_EXPIRY_SWEEP_INTERVAL_SECS: u64 = 3_600;
pub const BATCH_EXPIRY_FETCH_SIZE: i64 = 100;

// ── Transaction manager ────────────────────────────────────────────────

/// Additional attempts after the first, on a `40001` serialization failure.
pub const TXN_MANAGER_MAX_RETRIES: u32 = 3;

/// Backoff formula: `50 * 2^n` ms plus uniform jitter in `[0, backoff/2)`.
pub const TXN_MANAGER_BACKOFF_BASE_MS: u64 = 50;

/// Non-balance optimistic-version writes (role change, deactivation) retry the
/// read-modify-write loop this many times before surfacing `VERSION_CONFLICT`.
pub const VERSION_CONFLICT_MAX_RETRIES: u32 = 3;

// ── Daily bonus ─────────────────────────────────────────────────────

/// Fallback bonus amount when `system_settings` has no (or an unparsable)
/// value for the bonus-points key.
pub const DEFAULT_DAILY_BONUS_POINTS: i64 = 5;

/// Logical-day zone and cutover hour. Asia/Tokyo with a 06:00 cutover is the
/// shipped default, kept configurable rather than baked into the engine.
pub const DEFAULT_BONUS_TIMEZONE: chrono_tz::Tz = chrono_tz::Asia::Tokyo;
pub const DEFAULT_BONUS_CUTOVER_HOUR: u32 = 6;

pub const SYSTEM_SETTINGS_BONUS_POINTS_KEY: &str = "daily_bonus_points";

// ── Access poller ──────────────────────────────────────────────────────

/// Top-level tick cadence of the poller's own loop.
pub const POLLER_TICK_INTERVAL_SECS: u64 = 300;

/// Below this gap since the last poll, a single window is fetched (normal
/// mode); at or above it, the gap is split into fixed recovery windows.
pub const POLLER_NORMAL_GAP_MINUTES: i64 = 10;
pub const POLLER_NORMAL_FETCH_LIMIT: i64 = 300;

pub const POLLER_RECOVERY_WINDOW_HOURS: i64 = 1;
pub const POLLER_RECOVERY_FETCH_LIMIT: i64 = 720;
pub const POLLER_RECOVERY_INTER_WINDOW_SLEEP_SECS: u64 = 60;

// ── Database connection pool ─────────────────────────────────────────────

pub const DB_POOL_MIN_IDLE: u32 = 25;
pub const DB_POOL_MAX_OPEN: u32 = 100;
pub const DB_POOL_MAX_LIFETIME_SECS: u64 = 3_600;
pub const DB_POOL_MAX_IDLE_SECS: u64 = 600;

// ── Postgres vendor codes ─────────────────────────────────────────────────────

/// SQLSTATE for a serialization failure under REPEATABLE READ / SERIALIZABLE.
pub const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for a unique-constraint violation (idempotency keys, daily bonus).
pub const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
