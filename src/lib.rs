//! Trading daemon control plane.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.json / config.dat
//!          │
//!          ▼
//!   ┌──────────────┐   overrides   ┌──────────────┐
//!   │ ConfigStore  │──────────────▶│    Engine    │
//!   │ (decrypt,    │               │ start / stop │
//!   │  migrate)    │               └──────┬───────┘
//!   └──────────────┘                      │
//!                        ┌────────────────┼─────────────────┐
//!                        ▼                ▼                 ▼
//!                 ┌────────────┐   ┌────────────┐   ┌──────────────┐
//!                 │  database  │   │ RPC server │◀──│ REST gateway │
//!                 │  manager   │   │ (TLS, auth)│   │ (TLS, basic) │
//!                 └─────┬──────┘   └─────┬──────┘   └──────────────┘
//!                       │                ▼
//!                       │         ┌────────────┐
//!                       └────────▶│  trading   │ accounts, prices,
//!                                 │  services  │ forwarding
//!                                 └────────────┘
//! ```

pub mod config;
pub mod database;
pub mod engine;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;
pub mod trading;

pub use config::{ConfigDocument, ConfigStore};
pub use engine::{Engine, EngineError, FlagSet, Settings};
pub use lifecycle::Shutdown;
