//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.json / config.dat
//!     → loader.rs (resolve path, migrate into data dir)
//!     → encryption.rs (decrypt with the operator passphrase)
//!     → versions.rs (upgrade the raw document)
//!     → ConfigDocument (serde)
//!     → validation.rs (repair defaults, create log dir)
//!     → ConfigStore (single mutex, get/set)
//!
//! On save:
//!     ConfigStore → serde_json (indented)
//!     → encryption.rs (if enabled, session key cached per process)
//!     → writer
//! ```
//!
//! # Design Decisions
//! - The store is owned and injected, never global
//! - All fields have defaults to allow minimal configs
//! - Prompts go through the `Prompter` trait and never run under the lock

pub mod encryption;
pub mod error;
pub mod loader;
pub mod prompt;
pub mod schema;
pub mod store;
pub mod validation;
pub mod versions;

pub use error::ConfigError;
pub use loader::{default_data_dir, get_and_migrate_default_path, resolve_path};
pub use prompt::{Prompter, TerminalPrompter};
pub use schema::{ConfigDocument, EncryptionMode, LoggingConfig};
pub use store::ConfigStore;
