//! Request pipeline run before every RPC handler.
//!
//! Each call gets a [`CallContext`]; the pipeline's stages inspect and
//! annotate it in order, and the first stage to fail rejects the call
//! before any handler code runs.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::rpc::error::RpcError;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Lower-cased call metadata (request headers).
#[derive(Debug, Clone, Default)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self(
            headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
                })
                .collect(),
        )
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.push((key.to_ascii_lowercase(), value.into()));
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Per-call state, visible to handlers as a request extension.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub method: String,
    pub peer: Option<SocketAddr>,
    pub metadata: Option<Metadata>,
    pub request_id: String,
    /// Set when the caller asked for verbose handling.
    pub verbose: bool,
}

impl CallContext {
    pub fn peer_display(&self) -> String {
        self.peer
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// One pipeline stage.
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(&self, ctx: &mut CallContext) -> Result<(), RpcError>;
}

/// Ordered interceptor stages shared by every call.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Interceptor>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: impl Interceptor + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn run(&self, ctx: &mut CallContext) -> Result<(), RpcError> {
        for stage in &self.stages {
            if let Err(e) = stage.intercept(ctx) {
                tracing::warn!(
                    stage = stage.name(),
                    method = %ctx.method,
                    peer = %ctx.peer_display(),
                    error = %e,
                    "RPC call rejected"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Builds the call context, runs the pipeline and hands the context to the
/// handler.
pub async fn pipeline_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let method = request
        .uri()
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut ctx = CallContext {
        method,
        peer,
        metadata: Some(Metadata::from_headers(request.headers())),
        request_id,
        verbose: false,
    };

    if let Err(e) = pipeline.run(&mut ctx) {
        return e.into_response();
    }

    if ctx.verbose {
        tracing::info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            peer = %ctx.peer_display(),
            "RPC call"
        );
    } else {
        tracing::debug!(request_id = %ctx.request_id, method = %ctx.method, "RPC call");
    }

    request.extensions_mut().insert(ctx);
    next.run(request).await
}
