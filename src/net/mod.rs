//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! RPC subsystem start
//!     → certs.rs (ensure <data dir>/tls/cert.pem + key.pem)
//!     → listener.rs (bind host:port)
//!     → tls.rs (rustls server config from the PEM files)
//!     → hand off to axum-server
//! ```
//!
//! # Design Decisions
//! - Certificates are self-signed and regenerated on expiry
//! - Subject names come from the hostname and local interfaces
//! - The same PEM is the trust root for in-process HTTPS clients

pub mod certs;
pub mod interfaces;
pub mod listener;
pub mod tls;
