//! FIFO point-batch accounting and expiration.

pub mod engine;
pub mod worker;

pub use engine::BatchEngine;
pub use worker::run_expiry_worker;
