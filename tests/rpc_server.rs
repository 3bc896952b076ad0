//! End-to-end tests of the RPC server and REST gateway over TLS.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use trading_daemon::rpc::auth::REALM_CHALLENGE;
use trading_daemon::rpc::handlers::SHUTDOWN_NOT_ALLOWED;
use trading_daemon::rpc::ServerState;
use trading_daemon::{ConfigDocument, Engine, FlagSet, Settings};

mod common;

struct Daemon {
    engine: Engine,
    client: reqwest::Client,
    rpc: String,
    gateway: Option<String>,
    _dir: tempfile::TempDir,
}

impl Daemon {
    async fn start(configure: impl FnOnce(&mut ConfigDocument)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = common::quiet_document(dir.path());
        doc.remote_control.rpc.enabled = true;
        configure(&mut doc);
        let config_file = common::write_config(dir.path(), &doc);

        let settings = Settings {
            config_file,
            ..Default::default()
        };
        let engine =
            Engine::new_from_settings_with(settings, &FlagSet::new(), Arc::new(common::NoPrompt))
                .unwrap()
                .with_trading_services(common::fake_services());
        engine.start().await.unwrap();

        let rpc = format!("https://{}", engine.rpc_local_addr().expect("rpc bound"));
        let gateway = engine.gateway_local_addr().map(|addr| format!("https://{addr}"));
        Self {
            client: common::tls_client(dir.path()),
            engine,
            rpc,
            gateway,
            _dir: dir,
        }
    }

    fn data_dir(&self) -> &Path {
        self._dir.path()
    }

    async fn call(&self, method: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/rpc/{method}", self.rpc))
            .basic_auth(common::USERNAME, Some(common::PASSWORD))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn stop(self) {
        tokio::time::timeout(Duration::from_secs(10), self.engine.stop())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_authenticated_call_reaches_services() {
    let daemon = Daemon::start(|_| {}).await;
    assert_eq!(daemon.engine.rpc_state(), ServerState::Serving);

    let res = daemon.call("GetAccounts", json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["accounts"][0]["name"], "main");
    assert_eq!(body["accounts"][0]["chainName"], "solana");

    let res = daemon.call("GetTokenPrice", json!({ "tokenAddress": "Mint111" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["tokenPrice"]["address"], "Mint111");
    assert_eq!(body["tokenPrice"]["solPrice"], 75.0);

    daemon.stop().await;
}

#[tokio::test]
async fn test_bad_credentials_rejected() {
    let daemon = Daemon::start(|_| {}).await;

    let res = daemon
        .client
        .post(format!("{}/rpc/GetAccounts", daemon.rpc))
        .basic_auth(common::USERNAME, Some("wrong"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "username/password mismatch");

    let res = daemon
        .client
        .post(format!("{}/rpc/GetAccounts", daemon.rpc))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    daemon.stop().await;
}

#[tokio::test]
async fn test_validation_errors() {
    let daemon = Daemon::start(|_| {}).await;

    let res = daemon.call("Crypto", json!({ "plaintext": "" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "enter a partial private key");

    let res = daemon
        .call("TransferToken", json!({ "address": "Addr1111", "tokenMint": "" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    daemon.stop().await;
}

#[tokio::test]
async fn test_transfer_sol_uses_address_file() {
    let daemon = Daemon::start(|_| {}).await;
    std::fs::write(daemon.data_dir().join("addresses.txt"), "R1\n\nR2\n").unwrap();

    let res = daemon.call("TransferSOL", json!({ "address": "Addr1111" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["txSignatures"], json!(["sol->R1", "sol->R2"]));

    daemon.stop().await;
}

#[tokio::test]
async fn test_shutdown_requires_permission() {
    let denied = Daemon::start(|_| {}).await;
    let res = denied.call("Shutdown", json!({})).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], SHUTDOWN_NOT_ALLOWED);
    denied.stop().await;

    let allowed = Daemon::start(|doc| doc.remote_control.rpc.allow_shutdown = true).await;
    let res = allowed.call("Shutdown", json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    tokio::time::timeout(Duration::from_secs(5), allowed.engine.wait_for_shutdown_request())
        .await
        .unwrap();
    allowed.stop().await;
}

#[tokio::test]
async fn test_gateway_requires_basic_auth() {
    let daemon = Daemon::start(|doc| doc.remote_control.rpc.gateway_enabled = true).await;
    assert_eq!(daemon.engine.rpc_state(), ServerState::ServingWithGateway);
    let gateway = daemon.gateway.clone().expect("gateway bound");

    let res = daemon
        .client
        .get(format!("{gateway}/v1/accounts"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["www-authenticate"], REALM_CHALLENGE);

    daemon.stop().await;
}

#[tokio::test]
async fn test_gateway_forwards_to_rpc() {
    let daemon = Daemon::start(|doc| doc.remote_control.rpc.gateway_enabled = true).await;
    let gateway = daemon.gateway.clone().expect("gateway bound");

    let res = daemon
        .client
        .get(format!("{gateway}/v1/tokenprice/Mint222"))
        .basic_auth(common::USERNAME, Some(common::PASSWORD))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["tokenPrice"]["address"], "Mint222");

    let res = daemon
        .client
        .post(format!("{gateway}/v1/crypto"))
        .basic_auth(common::USERNAME, Some(common::PASSWORD))
        .json(&json!({ "plaintext": "abc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["ciphertext"], "sealed(abc)");

    daemon.stop().await;
}

#[tokio::test]
async fn test_stop_closes_listeners() {
    let daemon = Daemon::start(|_| {}).await;
    let client = daemon.client.clone();
    let rpc = daemon.rpc.clone();
    daemon.stop().await;

    let result = client
        .post(format!("{rpc}/rpc/GetAccounts"))
        .basic_auth(common::USERNAME, Some(common::PASSWORD))
        .json(&json!({}))
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.is_err());
}
