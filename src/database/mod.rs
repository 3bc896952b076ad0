//! Database subsystem.
//!
//! # Data Flow
//! ```text
//! Engine::start (database flag set)
//!     → manager.rs (validate config, resolve <data dir>/database/<name>)
//!     → connection.rs (r2d2 pool, embedded migrations)
//!     → monitor task pings the pool until stop
//!
//! Collaborators
//!     → DatabaseHandle::pool()
//!     → accounts.rs (diesel queries)
//!     → model.rs rows
//! ```
//!
//! # Design Decisions
//! - SQLite only, bundled
//! - The handle is shared; a missing or stopped manager reads as
//!   "database support disabled"

pub mod accounts;
pub mod connection;
pub mod manager;
pub mod model;
pub mod schema;

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

pub use connection::DbPool;
pub use manager::DatabaseConnectionManager;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database support disabled")]
    SupportDisabled,

    #[error("unsupported database driver {0}")]
    UnsupportedDriver(String),

    #[error("database name not set")]
    MissingName,

    #[error("database connection error: {0}")]
    Connection(String),

    #[error("database migration error: {0}")]
    Migration(String),

    #[error("database query error: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("database I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared slot for the engine's database manager.
#[derive(Clone, Default)]
pub struct DatabaseHandle {
    manager: Arc<RwLock<Option<Arc<DatabaseConnectionManager>>>>,
}

impl DatabaseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, manager: Arc<DatabaseConnectionManager>) {
        *self.manager.write() = Some(manager);
    }

    pub fn manager(&self) -> Option<Arc<DatabaseConnectionManager>> {
        self.manager.read().clone()
    }

    /// The live pool, or `SupportDisabled` when no manager is connected.
    pub fn pool(&self) -> Result<DbPool, DatabaseError> {
        self.manager()
            .ok_or(DatabaseError::SupportDisabled)?
            .pool()
    }
}
