//! TCP listener binding for the RPC server and gateway.
//!
//! # Responsibilities
//! - Resolve and bind configured host:port addresses
//! - Hand a non-blocking std listener to axum-server

use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(String, std::io::Error),
    /// Failed to convert or inspect the bound socket.
    Socket(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            ListenerError::Socket(e) => write!(f, "Socket error: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bound listener ready to be served.
pub struct BoundListener {
    pub inner: std::net::TcpListener,
    pub local_addr: SocketAddr,
}

/// Bind to `address`, resolving host names such as "localhost".
pub async fn bind(address: &str) -> Result<BoundListener, ListenerError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| ListenerError::Bind(address.to_string(), e))?;

    let local_addr = listener.local_addr().map_err(ListenerError::Socket)?;
    tracing::info!(address = %local_addr, "Listener bound");

    let inner = listener.into_std().map_err(ListenerError::Socket)?;
    Ok(BoundListener { inner, local_addr })
}

/// Address a local client should dial to reach `addr`.
pub fn dial_address(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        ip if ip.is_unspecified() && ip.is_ipv4() => {
            SocketAddr::from(([127, 0, 0, 1], addr.port()))
        }
        ip if ip.is_unspecified() => SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, addr.port())),
        _ => addr,
    }
}
