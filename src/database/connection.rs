//! Database connection management using Diesel ORM.
//!
//! Provides connection pooling, migration support, and the health ping used
//! by the connection manager.

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use super::DatabaseError;

/// Embedded database migrations compiled from the migrations/ directory.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Type alias for a SQLite connection pool.
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Create a connection pool for the given database URL.
pub fn create_pool(database_url: &str) -> Result<DbPool, DatabaseError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .max_size(5)
        .build(manager)
        .map_err(|e| DatabaseError::Connection(e.to_string()))
}

/// Run all pending database migrations.
pub fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    let mut conn = pool
        .get()
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    diesel::sql_query("PRAGMA busy_timeout=5000").execute(&mut conn)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    Ok(())
}

/// Round-trips a trivial query through the pool.
pub fn ping(pool: &DbPool) -> Result<(), DatabaseError> {
    let mut conn = pool
        .get()
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    diesel::sql_query("SELECT 1").execute(&mut conn)?;
    Ok(())
}
