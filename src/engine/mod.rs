//! Engine subsystem.
//!
//! # Data Flow
//! ```text
//! Settings + FlagSet (command line)
//!     → instance.rs (load config, init logging, merge overrides)
//!     → Engine::start
//!         → database manager (subsystem.rs contract)
//!         → RPC server (+ gateway)
//!         → long-running tasks registered in services.rs
//!     → Engine::stop
//!         → stop running subsystems
//!         → wait for every registered task
//!         → flush the logger
//! ```
//!
//! # Design Decisions
//! - No global engine: the binary owns it, subsystems get what they need
//! - Start and stop share one async mutex
//! - An unset flag never overrides config; an explicit flag always wins

pub mod instance;
pub mod services;
pub mod settings;
pub mod subsystem;

pub use instance::{Engine, EngineError};
pub use services::ServiceGroup;
pub use settings::{FlagSet, Settings};
pub use subsystem::{Subsystem, SubsystemError, SubsystemState};
