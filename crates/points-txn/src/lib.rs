//! Unit-of-work coordination.
//!
//! Every multi-statement domain operation (a balance adjustment, a transfer,
//! an admin grant) runs its reads and writes through one
//! [`TransactionManager::run`] call. The closure gets a live
//! `&mut sqlx::Transaction` to hand down into `points-db`'s repo functions;
//! nothing below this crate opens a connection or a transaction on its own.

pub mod manager;

pub use manager::TransactionManager;
