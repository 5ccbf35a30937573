pub mod constants;
pub mod domain;
pub mod error;
pub mod ids;
pub mod time;

pub use domain::*;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use ids::{
    DailyBonusId, IdempotencyKey, PointBatchId, QrTokenId, TransactionId, TransferRequestId,
    UserId,
};
pub use time::{FixedTimeProvider, LogicalDayPolicy, SystemTimeProvider, TimeProvider};
