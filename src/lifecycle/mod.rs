//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Engine::stop / subsystem stop → trigger → background tasks drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls Engine::stop
//! ```
//!
//! # Design Decisions
//! - Watch channel so late subscribers still see the trigger
//! - Every background task selects on its shutdown signal

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
