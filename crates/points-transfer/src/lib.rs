//! Transfer mechanisms: immediate, request/approve, and
//! QR-mediated.

pub mod direct;
pub mod janitor;
pub mod qr;
pub mod request;

pub use direct::direct_transfer;
pub use janitor::run_request_expiry_worker;
pub use qr::{create_qr_token, scan_qr_token, QR_TOKEN_TTL_MINUTES};
pub use request::{approve_request, cancel_request, create_request, reject_request};
