//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!
//! logging.rs:
//!     LoggingConfig → EnvFilter + fmt layer (text or JSON)
//!     → console, or <data dir>/logs/<file name>
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - The engine owns the handle and flushes it on stop

pub mod logging;

pub use logging::{init_logging, LoggerHandle, LoggingError};
