//! External access-event poller feeding the daily-bonus engine.

pub mod loop_;
pub mod source;

pub use loop_::run_poller;
pub use source::{AccessEventSource, AccessRecord, AccessUser, HttpAccessEventSource};
