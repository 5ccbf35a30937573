//! Postgres persistence layer.
//!
//! Domain types (`points-core`) stay free of any storage concern; this crate
//! owns the mapping between them and the `sqlx`-shaped rows that actually
//! live in Postgres, plus the schema that creates the tables in the first
//! place. Nothing in here opens or commits a transaction — that's
//! `points-txn`'s job — these functions only ever take an executor.

pub mod pool;
pub mod repo;
pub mod schema;

pub use pool::{connect, PoolConfig};
pub use schema::init_schema;
