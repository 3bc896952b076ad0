//! Authenticated RPC server and REST gateway.
//!
//! # Data Flow
//! ```text
//! HTTPS POST /rpc/{Method}
//!     → pipeline.rs (call context, interceptor stages)
//!     → auth.rs (Basic credentials, verbose tagging)
//!     → handlers.rs (field validation → trading services)
//!     → JSON response / RpcError
//!
//! HTTPS /v1/...
//!     → auth.rs (gateway Basic auth, 401 + realm challenge)
//!     → gateway.rs (translate to /rpc/{Method}, forward over TLS)
//! ```
//!
//! # Design Decisions
//! - One pipeline instance is shared by every call
//! - Credential checks are constant time
//! - Bind or TLS failures stop only this subsystem, never the engine

pub mod auth;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod pipeline;
pub mod server;
pub mod types;

pub use auth::{BasicAuthenticator, Credentials};
pub use error::{RpcCode, RpcError};
pub use handlers::RpcService;
pub use pipeline::{CallContext, Interceptor, Pipeline};
pub use server::{RpcServer, RpcServerConfig, ServerState};
