use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    RpcDailyStat, RpcHolderBalance, RpcMonthlyAggregate, RpcQrToken, RpcTransaction,
    RpcTransferRequest, RpcTransferResult, RpcTypeBreakdown, RpcUser,
};

/// Points platform JSON-RPC 2.0 API.
///
/// All method names are prefixed with "points_" via `namespace = "points"`.
/// User registration, authentication, and session handling live outside this
/// surface entirely — they're external collaborators the core never touches.
#[rpc(server, namespace = "points")]
pub trait PointsApi {
    /// Get a single account by its id.
    #[method(name = "getUser")]
    async fn get_user(&self, user_id: String) -> RpcResult<RpcUser>;

    /// Get an account's current balance.
    #[method(name = "getBalance")]
    async fn get_balance(&self, user_id: String) -> RpcResult<i64>;

    /// Paginated ledger entries where `user_id` is either party, newest first.
    #[method(name = "getTransactions")]
    async fn get_transactions(&self, user_id: String, limit: i64, offset: i64) -> RpcResult<Vec<RpcTransaction>>;

    /// Immediate, synchronous transfer. Idempotent on `idempotency_key`.
    #[method(name = "directTransfer")]
    async fn direct_transfer(
        &self,
        idempotency_key: String,
        from: String,
        to: String,
        amount: i64,
        description: String,
    ) -> RpcResult<RpcTransferResult>;

    /// File a two-phase transfer awaiting the recipient's decision.
    #[method(name = "createTransferRequest")]
    async fn create_transfer_request(
        &self,
        idempotency_key: String,
        from: String,
        to: String,
        amount: i64,
        message: Option<String>,
    ) -> RpcResult<RpcTransferRequest>;

    #[method(name = "approveTransferRequest")]
    async fn approve_transfer_request(&self, request_id: String, approving_user: String) -> RpcResult<RpcTransferRequest>;

    #[method(name = "rejectTransferRequest")]
    async fn reject_transfer_request(&self, request_id: String, rejecting_user: String) -> RpcResult<RpcTransferRequest>;

    #[method(name = "cancelTransferRequest")]
    async fn cancel_transfer_request(&self, request_id: String, cancelling_user: String) -> RpcResult<RpcTransferRequest>;

    /// Pending requests where `user_id` is either party.
    #[method(name = "listPendingTransferRequests")]
    async fn list_pending_transfer_requests(&self, user_id: String) -> RpcResult<Vec<RpcTransferRequest>>;

    /// Mint a single-use QR token. `kind` is `"receive"` or `"send"`.
    #[method(name = "createQrToken")]
    async fn create_qr_token(&self, owner: String, kind: String, amount: Option<i64>) -> RpcResult<RpcQrToken>;

    /// Scan a QR token, moving points in the direction its kind fixes.
    /// Idempotent on `idempotency_key`, same as `directTransfer`.
    #[method(name = "scanQrToken")]
    async fn scan_qr_token(
        &self,
        idempotency_key: String,
        code: String,
        scanner: String,
        scanner_supplied_amount: Option<i64>,
    ) -> RpcResult<RpcTransferResult>;

    /// Credit `target` through the batch engine. Admin-only.
    #[method(name = "adminGrant")]
    async fn admin_grant(
        &self,
        idempotency_key: String,
        admin: String,
        target: String,
        amount: i64,
        description: String,
    ) -> RpcResult<RpcTransferResult>;

    /// Debit `target` directly against aggregate balance, bypassing the batch
    /// engine. Admin-only.
    #[method(name = "adminDeduct")]
    async fn admin_deduct(
        &self,
        idempotency_key: String,
        admin: String,
        target: String,
        amount: i64,
        description: String,
    ) -> RpcResult<RpcTransferResult>;

    /// Change `target`'s role and/or active flag. Admin-only; an admin may
    /// not deactivate their own account.
    #[method(name = "adminSetRoleAndActive")]
    async fn admin_set_role_and_active(
        &self,
        admin: String,
        target: String,
        role: String,
        is_active: bool,
    ) -> RpcResult<RpcUser>;

    #[method(name = "adminTopHolders")]
    async fn admin_top_holders(&self, admin: String, limit: i64) -> RpcResult<Vec<RpcHolderBalance>>;

    #[method(name = "adminTypeBreakdown")]
    async fn admin_type_breakdown(&self, admin: String, since: chrono::DateTime<chrono::Utc>) -> RpcResult<Vec<RpcTypeBreakdown>>;

    #[method(name = "adminDailyStats")]
    async fn admin_daily_stats(&self, admin: String, days: i64) -> RpcResult<Vec<RpcDailyStat>>;

    #[method(name = "adminMonthlyAggregates")]
    async fn admin_monthly_aggregates(&self, admin: String, months_back: i64) -> RpcResult<Vec<RpcMonthlyAggregate>>;
}
