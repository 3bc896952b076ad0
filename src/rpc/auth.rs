//! HTTP Basic authentication for the RPC server and the REST gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use subtle::ConstantTimeEq;

use crate::rpc::error::RpcError;
use crate::rpc::pipeline::{CallContext, Interceptor};

pub const REALM_CHALLENGE: &str = "Basic realm=\"restricted\"";

/// Remote-control username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Constant-time comparison of both fields.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        bool::from(user_ok & pass_ok)
    }

    /// `authorization` header value for these credentials.
    pub fn header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Splits a `Basic` authorization value into username and password.
fn decode_basic(value: &str) -> Result<(String, String), RpcError> {
    if !value.contains("Basic") {
        return Err(RpcError::unauthenticated(
            "basic not found in authorization header",
        ));
    }

    let decoded = value
        .split_whitespace()
        .nth(1)
        .and_then(|token| STANDARD.decode(token).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| RpcError::unauthenticated("unable to base64 decode authorization header"))?;

    let (username, password) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));
    Ok((username.to_string(), password.to_string()))
}

/// Pipeline stage checking Basic credentials on every call.
pub struct BasicAuthenticator {
    credentials: Credentials,
}

impl BasicAuthenticator {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl Interceptor for BasicAuthenticator {
    fn name(&self) -> &'static str {
        "basic_auth"
    }

    fn intercept(&self, ctx: &mut CallContext) -> Result<(), RpcError> {
        let metadata = ctx
            .metadata
            .as_ref()
            .ok_or_else(|| RpcError::unauthenticated("unable to extract metadata"))?;

        let authorization = metadata
            .get(header::AUTHORIZATION.as_str())
            .ok_or_else(|| RpcError::unauthenticated("authorization header missing"))?;

        let (username, password) = decode_basic(authorization)?;
        if !self.credentials.matches(&username, &password) {
            return Err(RpcError::unauthenticated("username/password mismatch"));
        }

        if metadata.contains("verbose") {
            ctx.verbose = true;
        }
        Ok(())
    }
}

/// Gateway front door: Basic auth or 401 with a realm challenge.
pub async fn gateway_auth_middleware(
    State(credentials): State<Arc<Credentials>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| decode_basic(v).ok())
        .is_some_and(|(user, pass)| credentials.matches(&user, &pass));

    if authorized {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    tracing::warn!(
        ip = %peer,
        path = %request.uri().path(),
        "Gateway unauthorised access attempt"
    );

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, REALM_CHALLENGE)],
        "Access denied",
    )
        .into_response()
}
