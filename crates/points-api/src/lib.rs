//! points-api
//!
//! JSON-RPC 2.0 server exposing the point-economy interactors.
//!
//! Namespace: "points"
//! Methods:
//!   points_getUser                    — account summary
//!   points_getBalance                 — current balance
//!   points_getTransactions            — paginated ledger for an account
//!   points_directTransfer             — synchronous transfer
//!   points_createTransferRequest      — file a two-phase transfer
//!   points_approveTransferRequest
//!   points_rejectTransferRequest
//!   points_cancelTransferRequest
//!   points_listPendingTransferRequests
//!   points_createQrToken              — mint a QR token
//!   points_scanQrToken
//!   points_adminGrant                 — admin console
//!   points_adminDeduct
//!   points_adminSetRoleAndActive
//!   points_adminTopHolders
//!   points_adminTypeBreakdown
//!   points_adminDailyStats
//!   points_adminMonthlyAggregates

pub mod api;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerState};
pub use types::{
    RpcDailyStat, RpcHolderBalance, RpcMonthlyAggregate, RpcQrToken, RpcTransaction,
    RpcTransferRequest, RpcTransferResult, RpcTypeBreakdown, RpcUser,
};
