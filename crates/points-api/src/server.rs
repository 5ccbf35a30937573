use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use points_core::error::missing_key;
use points_core::{CoreError, ErrorKind, IdempotencyKey, QrTokenKind, Role, UserId};
use points_txn::TransactionManager;

use crate::api::PointsApiServer;
use crate::types::{
    RpcDailyStat, RpcHolderBalance, RpcMonthlyAggregate, RpcQrToken, RpcTransaction,
    RpcTransferRequest, RpcTransferResult, RpcTypeBreakdown, RpcUser,
};

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

/// Maps a [`CoreError`]'s stable kind to a JSON-RPC error code. Callers
/// should match on `error.data`/`code`, never parse the message text — the
/// taxonomy is the contract, the wording is not.
fn rpc_err_from_core(e: CoreError) -> ErrorObject<'static> {
    let code = match e.kind() {
        ErrorKind::InvalidAmount
        | ErrorKind::SameUser
        | ErrorKind::MissingKey
        | ErrorKind::InvalidRole
        | ErrorKind::InvalidState => -32602,
        ErrorKind::Unauthorized | ErrorKind::SelfDeactivation => -32001,
        ErrorKind::UserNotFound | ErrorKind::TransactionNotFound | ErrorKind::RequestNotFound | ErrorKind::QrNotFound => -32002,
        ErrorKind::UserInactive | ErrorKind::InsufficientBalance | ErrorKind::RequestExpired => -32003,
        ErrorKind::VersionConflict | ErrorKind::InProgress => -32004,
        ErrorKind::DbError | ErrorKind::ExternalError | ErrorKind::InsufficientBatches => -32603,
    };
    rpc_err(code, format!("{:?}: {}", e.kind(), e.message))
}

fn parse_user_id(raw: &str) -> RpcResult<UserId> {
    raw.parse().map_err(|_| rpc_err(-32602, format!("invalid user id: {raw}")))
}

fn parse_key(raw: String) -> RpcResult<IdempotencyKey> {
    IdempotencyKey::parse(raw).map_err(rpc_err_from_core)
}

fn parse_role(raw: &str) -> RpcResult<Role> {
    match raw {
        "user" => Ok(Role::User),
        "admin" => Ok(Role::Admin),
        other => Err(rpc_err_from_core(points_core::error::invalid_role(format!("unrecognized role: {other}")))),
    }
}

fn parse_qr_kind(raw: &str) -> RpcResult<QrTokenKind> {
    match raw {
        "receive" => Ok(QrTokenKind::Receive),
        "send" => Ok(QrTokenKind::Send),
        other => Err(rpc_err(-32602, format!("unrecognized QR token kind: {other}"))),
    }
}

/// Shared state passed to the RPC server.
pub struct RpcServerState {
    pub manager: TransactionManager,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers. Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

#[async_trait]
impl PointsApiServer for RpcServer {
    async fn get_user(&self, user_id: String) -> RpcResult<RpcUser> {
        let id = parse_user_id(&user_id)?;
        let user = points_db::repo::users::find_by_id(self.state.manager.pool(), id)
            .await
            .map_err(rpc_err_from_core)?;
        Ok(user.into())
    }

    async fn get_balance(&self, user_id: String) -> RpcResult<i64> {
        let id = parse_user_id(&user_id)?;
        let user = points_db::repo::users::find_by_id(self.state.manager.pool(), id)
            .await
            .map_err(rpc_err_from_core)?;
        Ok(user.balance)
    }

    async fn get_transactions(&self, user_id: String, limit: i64, offset: i64) -> RpcResult<Vec<RpcTransaction>> {
        let id = parse_user_id(&user_id)?;
        let limit = limit.clamp(1, 200);
        let txns = points_db::repo::transactions::list_for_user(self.state.manager.pool(), id, limit, offset.max(0))
            .await
            .map_err(rpc_err_from_core)?;
        Ok(txns.into_iter().map(Into::into).collect())
    }

    async fn direct_transfer(
        &self,
        idempotency_key: String,
        from: String,
        to: String,
        amount: i64,
        description: String,
    ) -> RpcResult<RpcTransferResult> {
        let key = parse_key(idempotency_key)?;
        let from = parse_user_id(&from)?;
        let to = parse_user_id(&to)?;
        let outcome = points_transfer::direct_transfer(&self.state.manager, &key, from, to, amount, &description, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(outcome.into())
    }

    async fn create_transfer_request(
        &self,
        idempotency_key: String,
        from: String,
        to: String,
        amount: i64,
        message: Option<String>,
    ) -> RpcResult<RpcTransferRequest> {
        if idempotency_key.is_empty() {
            return Err(rpc_err_from_core(missing_key("an idempotency key is required")));
        }
        let from = parse_user_id(&from)?;
        let to = parse_user_id(&to)?;
        let request = points_transfer::create_request(&self.state.manager, idempotency_key, from, to, amount, message, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(request.into())
    }

    async fn approve_transfer_request(&self, request_id: String, approving_user: String) -> RpcResult<RpcTransferRequest> {
        let id = request_id.parse().map_err(|_| rpc_err(-32602, format!("invalid request id: {request_id}")))?;
        let user = parse_user_id(&approving_user)?;
        let request = points_transfer::approve_request(&self.state.manager, id, user, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(request.into())
    }

    async fn reject_transfer_request(&self, request_id: String, rejecting_user: String) -> RpcResult<RpcTransferRequest> {
        let id = request_id.parse().map_err(|_| rpc_err(-32602, format!("invalid request id: {request_id}")))?;
        let user = parse_user_id(&rejecting_user)?;
        let request = points_transfer::reject_request(&self.state.manager, id, user, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(request.into())
    }

    async fn cancel_transfer_request(&self, request_id: String, cancelling_user: String) -> RpcResult<RpcTransferRequest> {
        let id = request_id.parse().map_err(|_| rpc_err(-32602, format!("invalid request id: {request_id}")))?;
        let user = parse_user_id(&cancelling_user)?;
        let request = points_transfer::cancel_request(&self.state.manager, id, user, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(request.into())
    }

    async fn list_pending_transfer_requests(&self, user_id: String) -> RpcResult<Vec<RpcTransferRequest>> {
        let id = parse_user_id(&user_id)?;
        let requests = points_db::repo::transfer_requests::list_pending_for_user(self.state.manager.pool(), id)
            .await
            .map_err(rpc_err_from_core)?;
        Ok(requests.into_iter().map(Into::into).collect())
    }

    async fn create_qr_token(&self, owner: String, kind: String, amount: Option<i64>) -> RpcResult<RpcQrToken> {
        let owner = parse_user_id(&owner)?;
        let kind = parse_qr_kind(&kind)?;
        let token = points_transfer::create_qr_token(&self.state.manager, owner, kind, amount, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(token.into())
    }

    async fn scan_qr_token(
        &self,
        idempotency_key: String,
        code: String,
        scanner: String,
        scanner_supplied_amount: Option<i64>,
    ) -> RpcResult<RpcTransferResult> {
        let key = parse_key(idempotency_key)?;
        let scanner = parse_user_id(&scanner)?;
        let outcome = points_transfer::scan_qr_token(&self.state.manager, &key, code, scanner, scanner_supplied_amount, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(outcome.into())
    }

    async fn admin_grant(
        &self,
        idempotency_key: String,
        admin: String,
        target: String,
        amount: i64,
        description: String,
    ) -> RpcResult<RpcTransferResult> {
        let key = parse_key(idempotency_key)?;
        let admin = parse_user_id(&admin)?;
        let target = parse_user_id(&target)?;
        let outcome = points_admin::grant_points(&self.state.manager, &key, admin, target, amount, &description, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(outcome.into())
    }

    async fn admin_deduct(
        &self,
        idempotency_key: String,
        admin: String,
        target: String,
        amount: i64,
        description: String,
    ) -> RpcResult<RpcTransferResult> {
        let key = parse_key(idempotency_key)?;
        let admin = parse_user_id(&admin)?;
        let target = parse_user_id(&target)?;
        let outcome = points_admin::deduct_points(&self.state.manager, &key, admin, target, amount, &description, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(outcome.into())
    }

    async fn admin_set_role_and_active(&self, admin: String, target: String, role: String, is_active: bool) -> RpcResult<RpcUser> {
        let admin = parse_user_id(&admin)?;
        let target = parse_user_id(&target)?;
        let role = parse_role(&role)?;
        let user = points_admin::set_role_and_active(&self.state.manager, admin, target, role, is_active, Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(user.into())
    }

    async fn admin_top_holders(&self, admin: String, limit: i64) -> RpcResult<Vec<RpcHolderBalance>> {
        let admin = parse_user_id(&admin)?;
        let holders = points_admin::top_holders(self.state.manager.pool(), admin, limit.clamp(1, 200))
            .await
            .map_err(rpc_err_from_core)?;
        Ok(holders.into_iter().map(Into::into).collect())
    }

    async fn admin_type_breakdown(&self, admin: String, since: DateTime<Utc>) -> RpcResult<Vec<RpcTypeBreakdown>> {
        let admin = parse_user_id(&admin)?;
        let rows = points_admin::type_breakdown(self.state.manager.pool(), admin, since)
            .await
            .map_err(rpc_err_from_core)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn admin_daily_stats(&self, admin: String, days: i64) -> RpcResult<Vec<RpcDailyStat>> {
        let admin = parse_user_id(&admin)?;
        let rows = points_admin::daily_stats(self.state.manager.pool(), admin, days.clamp(1, 366), Utc::now())
            .await
            .map_err(rpc_err_from_core)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn admin_monthly_aggregates(&self, admin: String, months_back: i64) -> RpcResult<Vec<RpcMonthlyAggregate>> {
        let admin = parse_user_id(&admin)?;
        let rows = points_admin::monthly_aggregates(self.state.manager.pool(), admin, months_back.clamp(1, 60))
            .await
            .map_err(rpc_err_from_core)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
