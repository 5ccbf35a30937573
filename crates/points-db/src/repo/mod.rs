//! Row types and queries, one module per entity.
//!
//! Every query function is generic over `E: PgExecutor<'c>` so callers can
//! pass either a bare `&PgPool` for read-only lookups or `&mut Transaction`
//! when the call is part of a unit of work coordinated by `points-txn`. None
//! of these functions open or commit a transaction themselves.

pub mod analytics;
pub mod batches;
pub mod bonuses;
pub mod idempotency;
pub mod poll_cursor;
pub mod qr_tokens;
pub mod settings;
pub mod transactions;
pub mod transfer_requests;
pub mod users;
