//! Balance adjustment engine — the single place that ever writes to
//! `users.balance`.

pub mod engine;

pub use engine::{BalanceAdjustment, BalanceEngine};
