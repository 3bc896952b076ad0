//! REST gateway in front of the RPC server.
//!
//! Each `/v1` route is translated into a `POST /rpc/{Method}` call and
//! forwarded over TLS, trusting the daemon's own certificate and carrying
//! the configured credentials. The gateway itself sits behind HTTP Basic
//! auth.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::net::listener::dial_address;
use crate::net::tls::load_root_certificate;
use crate::rpc::auth::{gateway_auth_middleware, Credentials};
use crate::rpc::pipeline::X_REQUEST_ID;
use crate::rpc::types::*;

/// Forwarding state shared by the gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    client: reqwest::Client,
    endpoint: String,
    authorization: String,
}

impl GatewayState {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, credentials: &Credentials) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            authorization: credentials.header_value(),
        }
    }

    /// Client trusting only `cert_path`, targeting the RPC server at `rpc_addr`.
    pub fn connect(
        rpc_addr: SocketAddr,
        cert_path: &Path,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self, std::io::Error> {
        let root = load_root_certificate(cert_path)?;
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(root)
            .timeout(timeout)
            .build()
            .map_err(std::io::Error::other)?;
        let endpoint = format!("https://{}", dial_address(rpc_addr));
        Ok(Self::new(client, endpoint, credentials))
    }

    async fn forward(&self, method: &str, headers: &HeaderMap, body: Vec<u8>) -> Response {
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        tracing::debug!(request_id = %request_id, method, "Proxying gateway call");

        let mut upstream = self
            .client
            .post(format!("{}/rpc/{method}", self.endpoint))
            .header(header::AUTHORIZATION, &self.authorization)
            .header(header::CONTENT_TYPE, "application/json")
            .header(X_REQUEST_ID, &request_id)
            .body(body);
        if let Some(verbose) = headers.get("verbose") {
            upstream = upstream.header("verbose", verbose.clone());
        }

        match upstream.send().await {
            Ok(response) => {
                let status = StatusCode::from_u16(response.status().as_u16())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
                match response.bytes().await {
                    Ok(bytes) => {
                        let mut reply = (status, Body::from(bytes)).into_response();
                        if let Some(ct) = content_type {
                            reply.headers_mut().insert(header::CONTENT_TYPE, ct);
                        }
                        reply
                    }
                    Err(e) => upstream_failure(&request_id, method, e),
                }
            }
            Err(e) => upstream_failure(&request_id, method, e),
        }
    }
}

fn upstream_failure(request_id: &str, method: &str, err: reqwest::Error) -> Response {
    tracing::error!(request_id = %request_id, method, error = %err, "Upstream error");
    (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
}

fn json_body<T: serde::Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec())
}

async fn accounts(State(gateway): State<GatewayState>, headers: HeaderMap) -> Response {
    gateway
        .forward(METHOD_GET_ACCOUNTS, &headers, json_body(&GetAccountsRequest {}))
        .await
}

async fn token_price(
    State(gateway): State<GatewayState>,
    UrlPath(address): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    let request = GetTokenPriceRequest {
        token_address: address,
    };
    gateway
        .forward(METHOD_GET_TOKEN_PRICE, &headers, json_body(&request))
        .await
}

async fn crypto(State(gateway): State<GatewayState>, headers: HeaderMap, body: Bytes) -> Response {
    gateway.forward(METHOD_CRYPTO, &headers, body.to_vec()).await
}

async fn transfer_sol(
    State(gateway): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    gateway.forward(METHOD_TRANSFER_SOL, &headers, body.to_vec()).await
}

async fn transfer_token(
    State(gateway): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    gateway.forward(METHOD_TRANSFER_TOKEN, &headers, body.to_vec()).await
}

async fn shutdown(State(gateway): State<GatewayState>, headers: HeaderMap) -> Response {
    gateway
        .forward(METHOD_SHUTDOWN, &headers, json_body(&ShutdownRequest {}))
        .await
}

/// `/v1` routes behind Basic auth.
#[allow(deprecated)]
pub fn router(state: GatewayState, credentials: Arc<Credentials>, timeout: Duration) -> Router {
    Router::new()
        .route("/v1/accounts", get(accounts))
        .route("/v1/tokenprice/{address}", get(token_price))
        .route("/v1/crypto", post(crypto))
        .route("/v1/transfer/sol", post(transfer_sol))
        .route("/v1/transfer/token", post(transfer_token))
        .route("/v1/shutdown", post(shutdown))
        .with_state(state)
        .layer(middleware::from_fn_with_state(credentials, gateway_auth_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

/// Value of the challenge header, for clients checking a 401.
pub fn realm_challenge() -> HeaderValue {
    HeaderValue::from_static(crate::rpc::auth::REALM_CHALLENGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    fn gateway_to(endpoint: &str) -> Router {
        let credentials = Credentials::new("admin", "Password");
        let state = GatewayState::new(reqwest::Client::new(), endpoint, &credentials);
        router(state, Arc::new(credentials), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_missing_credentials_get_challenge() {
        let app = gateway_to("https://127.0.0.1:1");
        let response = app
            .oneshot(Request::get("/v1/accounts").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            &realm_challenge()
        );
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let app = gateway_to("https://127.0.0.1:1");
        let response = app
            .oneshot(
                Request::get("/v1/accounts")
                    .header("authorization", Credentials::new("admin", "x").header_value())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = closed.local_addr().unwrap();
        drop(closed);

        let app = gateway_to(&format!("http://{addr}"));
        let response = app
            .oneshot(
                Request::get("/v1/accounts")
                    .header("authorization", Credentials::new("admin", "Password").header_value())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
