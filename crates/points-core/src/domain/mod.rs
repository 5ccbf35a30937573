pub mod daily_bonus;
pub mod idempotency;
pub mod point_batch;
pub mod poll_cursor;
pub mod qr_token;
pub mod transaction;
pub mod transfer_request;
pub mod user;

pub use daily_bonus::DailyBonus;
pub use idempotency::{IdempotencyRecord, IdempotencyStatus};
pub use point_batch::{BatchSource, PointBatch};
pub use poll_cursor::PollCursor;
pub use qr_token::{QrToken, QrTokenKind};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use transfer_request::{TransferRequest, TransferRequestStatus};
pub use user::{Role, User};
