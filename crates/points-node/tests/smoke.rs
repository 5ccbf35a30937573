//! End-to-end smoke test for points-node.
//!
//! Starts a real node process against a live Postgres instance, creates two
//! users directly through the pool, and exercises a direct transfer end to
//! end over JSON-RPC.
//!
//! Requires `DATABASE_URL` to point at a scratch Postgres database; skips
//! itself otherwise so this doesn't fail a sandbox with no database handy.
//!
//! Run with:
//!   DATABASE_URL=postgres://... cargo test -p points-node --test smoke

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

struct NodeGuard(Child);

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

async fn rpc_call(client: &reqwest::Client, url: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
    let body = serde_json::json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 1 });
    let resp = client.post(url).json(&body).send().await.unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    json["result"].clone()
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = serde_json::json!({ "jsonrpc": "2.0", "method": "points_getBalance", "params": [Uuid::nil().to_string()], "id": 1 });
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

#[tokio::test]
async fn smoke_direct_transfer() {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping points-node smoke test");
        return;
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("connect to scratch database");
    points_db::init_schema(&pool).await.expect("init schema");

    let now = Utc::now();
    let alice = points_core::User {
        id: points_core::UserId::new(),
        username: format!("alice-{}", Uuid::new_v4()),
        email: "alice@example.com".to_string(),
        password_hash: "unused".to_string(),
        last_name: "Smith".to_string(),
        first_name: "Alice".to_string(),
        balance: 1_000,
        role: points_core::Role::User,
        version: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let mut bob = alice.clone();
    bob.id = points_core::UserId::new();
    bob.username = format!("bob-{}", Uuid::new_v4());
    bob.email = "bob@example.com".to_string();
    bob.last_name = "Jones".to_string();
    bob.first_name = "Bob".to_string();
    bob.balance = 0;

    points_db::repo::users::insert(&pool, &alice).await.expect("insert alice");
    points_db::repo::users::insert(&pool, &bob).await.expect("insert bob");

    let rpc_port = free_port();
    let rpc_url = format!("http://127.0.0.1:{rpc_port}");

    let node_bin = env!("CARGO_BIN_EXE_points-node");
    let child = Command::new(node_bin)
        .args(["--rpc-addr", &format!("127.0.0.1:{rpc_port}")])
        .env("DATABASE_URL", &database_url)
        .env("ACCESS_POLLER_BASE_URL", "")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn points-node");
    let _guard = NodeGuard(child);

    let http = reqwest::Client::new();
    assert!(wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await, "points-node did not become ready within 20 seconds");

    let key = Uuid::new_v4().to_string();
    let result = rpc_call(
        &http,
        &rpc_url,
        "points_directTransfer",
        serde_json::json!([key, alice.id.to_string(), bob.id.to_string(), 300, "smoke test transfer"]),
    )
    .await;
    assert_eq!(result["replayed"], serde_json::json!(false));

    let alice_balance = rpc_call(&http, &rpc_url, "points_getBalance", serde_json::json!([alice.id.to_string()])).await;
    assert_eq!(alice_balance, serde_json::json!(700));
    let bob_balance = rpc_call(&http, &rpc_url, "points_getBalance", serde_json::json!([bob.id.to_string()])).await;
    assert_eq!(bob_balance, serde_json::json!(300));

    // Replaying the same idempotency key must not move points twice.
    let replay = rpc_call(
        &http,
        &rpc_url,
        "points_directTransfer",
        serde_json::json!([key, alice.id.to_string(), bob.id.to_string(), 300, "smoke test transfer"]),
    )
    .await;
    assert_eq!(replay["replayed"], serde_json::json!(true));
    let alice_balance_after_replay = rpc_call(&http, &rpc_url, "points_getBalance", serde_json::json!([alice.id.to_string()])).await;
    assert_eq!(alice_balance_after_replay, serde_json::json!(700));
}
