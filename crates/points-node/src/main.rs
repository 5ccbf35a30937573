//! points-node — the point-economy platform binary.
//!
//! Startup sequence:
//!   1. Load config (CLI flags for the RPC address, environment for secrets)
//!   2. Open the Postgres pool and apply the schema
//!   3. Start background workers: batch expiry sweeper, transfer-request
//!      janitor, and (if configured) the external access poller
//!   4. Start the JSON-RPC 2.0 server
//!   5. Wait for a shutdown signal, then stop the poller and exit

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use points_api::{RpcServer, RpcServerState};
use points_core::constants::DEFAULT_BONUS_CUTOVER_HOUR;
use points_core::time::{LogicalDayPolicy, SystemTimeProvider, TimeProvider};
use points_db::PoolConfig;
use points_poller::{AccessEventSource, HttpAccessEventSource};
use points_txn::TransactionManager;

#[derive(Parser, Debug)]
#[command(name = "points-node", version, about = "Point-economy platform node")]
struct Args {
    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    rpc_addr: SocketAddr,
}

/// Environment-sourced configuration. Kept separate from `Args`: these are
/// secrets and per-deployment settings (DB DSN, poller credentials), the kind
/// a 12-factor service takes from the environment rather than a flag.
#[derive(Debug, Deserialize)]
struct EnvConfig {
    database_url: String,
    #[serde(default)]
    access_poller_base_url: String,
    access_poller_api_key: Option<String>,
    #[serde(default = "default_bonus_timezone")]
    bonus_timezone: String,
    #[serde(default = "default_bonus_cutover_hour")]
    bonus_cutover_hour: u32,
}

fn default_bonus_timezone() -> String {
    "Asia/Tokyo".to_string()
}

fn default_bonus_cutover_hour() -> u32 {
    DEFAULT_BONUS_CUTOVER_HOUR
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,points=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let env: EnvConfig = envy::from_env().context("loading environment configuration")?;
    info!("points-node starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let pool_config = PoolConfig::from_database_url(env.database_url.clone());
    let pool = points_db::connect(&pool_config).await.context("connecting to database")?;
    points_db::init_schema(&pool).await.context("initializing schema")?;

    let manager = TransactionManager::new(pool);
    let clock: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let day_policy = LogicalDayPolicy {
        zone: env
            .bonus_timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid bonus_timezone: {}", env.bonus_timezone))?,
        cutover_hour: env.bonus_cutover_hour,
    };

    // ── Background workers ───────────────────────────────────────────────────
    tokio::spawn(points_batch::run_expiry_worker(manager.clone(), Arc::clone(&clock)));
    tokio::spawn(points_transfer::run_request_expiry_worker(manager.clone(), Arc::clone(&clock)));

    let (poller_shutdown_tx, poller_shutdown_rx) = tokio::sync::watch::channel(false);
    let access_source: Arc<dyn AccessEventSource> =
        Arc::new(HttpAccessEventSource::new(env.access_poller_base_url.clone(), env.access_poller_api_key.clone()));
    if access_source.is_configured() {
        tokio::spawn(points_poller::run_poller(
            manager.clone(),
            Arc::clone(&access_source),
            Arc::clone(&clock),
            day_policy,
            poller_shutdown_rx,
        ));
    } else {
        warn!("access_poller_base_url not set — daily-bonus access poller disabled");
    }

    // ── RPC server ────────────────────────────────────────────────────────────
    let rpc_state = Arc::new(RpcServerState { manager });
    let rpc_handle = RpcServer::new(rpc_state)
        .start(args.rpc_addr)
        .await
        .context("starting RPC server")?;

    info!(addr = %args.rpc_addr, "node ready");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received, exiting");

    let _ = poller_shutdown_tx.send(true);
    rpc_handle.stop().context("stopping RPC server")?;
    Ok(())
}
