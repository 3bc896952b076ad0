//! The authenticated RPC server subsystem.
//!
//! ```text
//! Unbound → Listening → Serving ─(gateway flag)→ ServingWithGateway
//!    ▲                                                  │
//!    └──────────────────── stop ────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use parking_lot::Mutex;

use crate::engine::services::ServiceGroup;
use crate::engine::subsystem::{
    StateCell, Subsystem, SubsystemError, MSG_SHUTDOWN, MSG_SHUTTING_DOWN, MSG_STARTED,
    MSG_STARTING,
};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{certs, listener, tls};
use crate::rpc::auth::{BasicAuthenticator, Credentials};
use crate::rpc::gateway::{self, GatewayState};
use crate::rpc::handlers::{self, RpcService};
use crate::rpc::pipeline::Pipeline;

const NAME: &str = "rpc_server";
const GATEWAY_NAME: &str = "rpc_gateway";

/// In-flight requests get this long to finish once shutdown starts.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unbound,
    Listening,
    Serving,
    ServingWithGateway,
}

/// Listener and TLS settings for one server instance.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub listen_address: String,
    pub gateway_listen_address: String,
    pub enable_gateway: bool,
    /// Holds `cert.pem` and `key.pem`.
    pub tls_dir: PathBuf,
    pub credentials: Credentials,
    /// Timeout for gateway → RPC calls.
    pub http_timeout: Duration,
}

pub struct RpcServer {
    config: RpcServerConfig,
    service: RpcService,
    lifecycle: StateCell,
    state: Mutex<ServerState>,
    shutdown: Mutex<Option<Shutdown>>,
    local_addr: Mutex<Option<SocketAddr>>,
    gateway_addr: Mutex<Option<SocketAddr>>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, service: RpcService) -> Self {
        Self {
            config,
            service,
            lifecycle: StateCell::new(),
            state: Mutex::new(ServerState::Unbound),
            shutdown: Mutex::new(None),
            local_addr: Mutex::new(None),
            gateway_addr: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Bound RPC address while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bound gateway address while serving with the gateway.
    pub fn gateway_addr(&self) -> Option<SocketAddr> {
        *self.gateway_addr.lock()
    }

    fn fail(&self, reason: String) -> SubsystemError {
        tracing::error!(subsystem = NAME, error = %reason, "RPC server failed to start");
        *self.state.lock() = ServerState::Unbound;
        *self.local_addr.lock() = None;
        self.lifecycle.finish_stop();
        SubsystemError::Start { name: NAME, reason }
    }

    async fn start_gateway(
        &self,
        services: &ServiceGroup,
        rpc_addr: SocketAddr,
        tls_config: RustlsConfig,
        signal: ShutdownSignal,
    ) -> Result<SocketAddr, String> {
        let cert_path = certs::cert_path(&self.config.tls_dir);
        let state = GatewayState::connect(
            rpc_addr,
            &cert_path,
            &self.config.credentials,
            self.config.http_timeout,
        )
        .map_err(|e| format!("unable to build gateway client: {e}"))?;

        let bound = listener::bind(&self.config.gateway_listen_address)
            .await
            .map_err(|e| e.to_string())?;
        let addr = bound.local_addr;

        let app = gateway::router(
            state,
            Arc::new(self.config.credentials.clone()),
            self.config.http_timeout,
        );
        services.spawn(GATEWAY_NAME, serve(GATEWAY_NAME, bound.inner, tls_config, app, signal));
        Ok(addr)
    }
}

/// Serves `app` over TLS until `signal` fires, then drains gracefully.
async fn serve(
    name: &'static str,
    listener: std::net::TcpListener,
    tls_config: RustlsConfig,
    app: Router,
    mut signal: ShutdownSignal,
) {
    let handle = Handle::new();
    let server = axum_server::from_tcp_rustls(listener, tls_config)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            if let Err(e) = result {
                tracing::error!(service = name, error = %e, "Server failed to serve");
            }
        }
        _ = signal.wait() => {
            handle.graceful_shutdown(Some(GRACE_PERIOD));
            if let Err(e) = server.await {
                tracing::error!(service = name, error = %e, "Server failed during shutdown");
            }
        }
    }
    tracing::debug!(service = name, "Server stopped");
}

#[async_trait]
impl Subsystem for RpcServer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    async fn start(&self, services: &ServiceGroup) -> Result<(), SubsystemError> {
        self.lifecycle.begin_start()?;
        tracing::debug!(subsystem = NAME, "{}", MSG_STARTING);

        let tls_dir = self.config.tls_dir.clone();
        match tokio::task::spawn_blocking(move || certs::ensure(&tls_dir)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.fail(format!("certificate check failed: {e}"))),
            Err(e) => return Err(self.fail(format!("certificate task failed: {e}"))),
        }

        let bound = match listener::bind(&self.config.listen_address).await {
            Ok(bound) => bound,
            Err(e) => return Err(self.fail(e.to_string())),
        };
        let rpc_addr = bound.local_addr;
        *self.local_addr.lock() = Some(rpc_addr);
        *self.state.lock() = ServerState::Listening;

        let tls_config = match tls::load_tls_config(
            &certs::cert_path(&self.config.tls_dir),
            &certs::key_path(&self.config.tls_dir),
        )
        .await
        {
            Ok(cfg) => cfg,
            Err(e) => return Err(self.fail(format!("could not load TLS keys: {e}"))),
        };

        let pipeline = Arc::new(
            Pipeline::new().with(BasicAuthenticator::new(self.config.credentials.clone())),
        );
        let app = handlers::router(self.service.clone(), pipeline);

        let shutdown = Shutdown::new();
        services.spawn(
            NAME,
            serve(NAME, bound.inner, tls_config.clone(), app, shutdown.subscribe()),
        );
        *self.state.lock() = ServerState::Serving;
        tracing::info!(subsystem = NAME, address = %rpc_addr, "RPC server listening on https");

        if self.config.enable_gateway {
            match self
                .start_gateway(services, rpc_addr, tls_config, shutdown.subscribe())
                .await
            {
                Ok(addr) => {
                    *self.gateway_addr.lock() = Some(addr);
                    *self.state.lock() = ServerState::ServingWithGateway;
                    tracing::info!(subsystem = GATEWAY_NAME, address = %addr, "REST gateway listening on https");
                }
                Err(e) => {
                    tracing::error!(subsystem = GATEWAY_NAME, error = %e, "Unable to start REST gateway");
                }
            }
        }

        *self.shutdown.lock() = Some(shutdown);
        self.lifecycle.finish_start();
        tracing::debug!(subsystem = NAME, "{}", MSG_STARTED);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.lifecycle.begin_stop()?;
        tracing::debug!(subsystem = NAME, "{}", MSG_SHUTTING_DOWN);

        if let Some(shutdown) = self.shutdown.lock().take() {
            shutdown.trigger();
        }
        *self.state.lock() = ServerState::Unbound;
        *self.local_addr.lock() = None;
        *self.gateway_addr.lock() = None;

        self.lifecycle.finish_stop();
        tracing::debug!(subsystem = NAME, "{}", MSG_SHUTDOWN);
        Ok(())
    }
}
