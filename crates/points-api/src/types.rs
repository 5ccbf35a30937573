use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use points_core::{QrToken, QrTokenKind, Role, Transaction, TransactionStatus, TransactionType, TransferRequest, TransferRequestStatus, User};
use points_db::repo::analytics::{DailyStat, HolderBalance, MonthlyAggregate, TypeBreakdown};
use points_idempotency::IdempotencyOutcome;

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Admin => "admin",
    }
}

fn txn_kind_str(kind: TransactionType) -> &'static str {
    match kind {
        TransactionType::Transfer => "transfer",
        TransactionType::AdminGrant => "admin_grant",
        TransactionType::AdminDeduct => "admin_deduct",
        TransactionType::SystemGrant => "system_grant",
        TransactionType::SystemExpire => "system_expire",
    }
}

fn txn_status_str(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Pending => "pending",
        TransactionStatus::Completed => "completed",
        TransactionStatus::Failed => "failed",
        TransactionStatus::Reversed => "reversed",
    }
}

fn request_status_str(status: TransferRequestStatus) -> &'static str {
    match status {
        TransferRequestStatus::Pending => "pending",
        TransferRequestStatus::Approved => "approved",
        TransferRequestStatus::Rejected => "rejected",
        TransferRequestStatus::Cancelled => "cancelled",
        TransferRequestStatus::Expired => "expired",
    }
}

fn qr_kind_str(kind: QrTokenKind) -> &'static str {
    match kind {
        QrTokenKind::Receive => "receive",
        QrTokenKind::Send => "send",
    }
}

/// Account summary returned by `points_getUser`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub last_name: String,
    pub first_name: String,
    pub balance: i64,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for RpcUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id.to_string(),
            username: u.username,
            email: u.email,
            last_name: u.last_name,
            first_name: u.first_name,
            balance: u.balance,
            role: role_str(u.role).to_string(),
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

/// Ledger entry returned by `points_getTransactions` and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransaction {
    pub id: String,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub amount: i64,
    pub kind: String,
    pub status: String,
    pub idempotency_key: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for RpcTransaction {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id.to_string(),
            from_user: t.from_user.map(|u| u.to_string()),
            to_user: t.to_user.map(|u| u.to_string()),
            amount: t.amount,
            kind: txn_kind_str(t.kind).to_string(),
            status: txn_status_str(t.status).to_string(),
            idempotency_key: t.idempotency_key,
            description: t.description,
            created_at: t.created_at,
            completed_at: t.completed_at,
        }
    }
}

/// Outcome of an idempotency-guarded, value-moving call. `replayed = true`
/// means a prior call under the same key already ran it — the caller got the
/// cached transaction id back, nothing moved twice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RpcTransferResult {
    pub transaction_id: String,
    pub replayed: bool,
}

impl From<IdempotencyOutcome> for RpcTransferResult {
    fn from(outcome: IdempotencyOutcome) -> Self {
        match outcome {
            IdempotencyOutcome::Fresh(id) => Self { transaction_id: id.to_string(), replayed: false },
            IdempotencyOutcome::Replayed(id) => Self { transaction_id: id.to_string(), replayed: true },
        }
    }
}

/// A pending or resolved two-phase transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransferRequest {
    pub id: String,
    pub from_user: String,
    pub to_user: String,
    pub amount: i64,
    pub message: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
}

impl From<TransferRequest> for RpcTransferRequest {
    fn from(r: TransferRequest) -> Self {
        Self {
            id: r.id.to_string(),
            from_user: r.from_user.to_string(),
            to_user: r.to_user.to_string(),
            amount: r.amount,
            message: r.message,
            status: request_status_str(r.status).to_string(),
            created_at: r.created_at,
            expires_at: r.expires_at,
            approved_at: r.approved_at,
            rejected_at: r.rejected_at,
            cancelled_at: r.cancelled_at,
            transaction_id: r.transaction_id.map(|t| t.to_string()),
        }
    }
}

/// A single-use QR token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcQrToken {
    pub id: String,
    pub code: String,
    pub owner: String,
    pub kind: String,
    pub amount: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<QrToken> for RpcQrToken {
    fn from(t: QrToken) -> Self {
        Self {
            id: t.id.to_string(),
            code: t.code,
            owner: t.owner.to_string(),
            kind: qr_kind_str(t.kind).to_string(),
            amount: t.amount,
            expires_at: t.expires_at,
            used_at: t.used_at,
            used_by: t.used_by.map(|u| u.to_string()),
            created_at: t.created_at,
        }
    }
}

/// One row of `points_adminTopHolders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcHolderBalance {
    pub user_id: String,
    pub username: String,
    pub balance: i64,
}

impl From<HolderBalance> for RpcHolderBalance {
    fn from(h: HolderBalance) -> Self {
        Self { user_id: h.user().to_string(), username: h.username, balance: h.balance }
    }
}

/// One row of `points_adminTypeBreakdown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTypeBreakdown {
    pub kind: String,
    pub transaction_count: i64,
    pub total_amount: i64,
}

impl From<TypeBreakdown> for RpcTypeBreakdown {
    fn from(b: TypeBreakdown) -> Self {
        Self { kind: b.kind, transaction_count: b.transaction_count, total_amount: b.total_amount }
    }
}

/// One row of `points_adminDailyStats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcDailyStat {
    pub day: NaiveDate,
    pub transaction_count: i64,
    pub total_volume: i64,
}

impl From<DailyStat> for RpcDailyStat {
    fn from(d: DailyStat) -> Self {
        Self { day: d.day, transaction_count: d.transaction_count, total_volume: d.total_volume }
    }
}

/// One row of `points_adminMonthlyAggregates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMonthlyAggregate {
    pub month: NaiveDate,
    pub transaction_count: i64,
    pub total_volume: i64,
}

impl From<MonthlyAggregate> for RpcMonthlyAggregate {
    fn from(m: MonthlyAggregate) -> Self {
        Self { month: m.month, transaction_count: m.transaction_count, total_volume: m.total_volume }
    }
}
