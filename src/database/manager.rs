//! Database connection manager subsystem.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::connection::{self, DbPool};
use super::DatabaseError;
use crate::config::schema::DatabaseConfig;
use crate::engine::services::ServiceGroup;
use crate::engine::subsystem::{
    StateCell, Subsystem, SubsystemError, MSG_SHUTDOWN, MSG_SHUTTING_DOWN, MSG_STARTED,
    MSG_STARTING,
};

const NAME: &str = "database_connection_manager";

/// Owns the connection pool and keeps it healthy while running.
pub struct DatabaseConnectionManager {
    config: DatabaseConfig,
    url: String,
    state: StateCell,
    pool: RwLock<Option<DbPool>>,
    stop: Arc<Notify>,
}

impl DatabaseConnectionManager {
    /// Validates `config` and resolves the database location under `dir`.
    pub fn setup(config: &DatabaseConfig, dir: &Path) -> Result<Self, DatabaseError> {
        if !matches!(config.driver.as_str(), "sqlite3" | "sqlite") {
            return Err(DatabaseError::UnsupportedDriver(config.driver.clone()));
        }
        if config.database.is_empty() {
            return Err(DatabaseError::MissingName);
        }

        let url = if config.database == ":memory:" || Path::new(&config.database).is_absolute() {
            config.database.clone()
        } else {
            dir.join(&config.database).display().to_string()
        };

        Ok(Self {
            config: config.clone(),
            url,
            state: StateCell::new(),
            pool: RwLock::new(None),
            stop: Arc::new(Notify::new()),
        })
    }

    /// Database location handed to SQLite.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The live pool, if the manager is connected.
    pub fn pool(&self) -> Result<DbPool, DatabaseError> {
        self.pool.read().clone().ok_or(DatabaseError::SupportDisabled)
    }

    async fn connect(&self) -> Result<DbPool, DatabaseError> {
        if let Some(parent) = PathBuf::from(&self.url).parent() {
            if !parent.as_os_str().is_empty() && self.url != ":memory:" {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let url = self.url.clone();
        tokio::task::spawn_blocking(move || {
            let pool = connection::create_pool(&url)?;
            connection::run_migrations(&pool)?;
            Ok::<_, DatabaseError>(pool)
        })
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?
    }
}

#[async_trait]
impl Subsystem for DatabaseConnectionManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_running(&self) -> bool {
        self.state.is_running()
    }

    async fn start(&self, services: &ServiceGroup) -> Result<(), SubsystemError> {
        if !self.config.enabled {
            return Err(SubsystemError::DatabaseSupportDisabled);
        }
        self.state.begin_start()?;
        tracing::debug!(subsystem = NAME, "{}", MSG_STARTING);

        let pool = match self.connect().await {
            Ok(pool) => pool,
            Err(e) => {
                self.state.finish_stop();
                return Err(SubsystemError::Start {
                    name: NAME,
                    reason: e.to_string(),
                });
            }
        };
        *self.pool.write() = Some(pool.clone());

        let stop = self.stop.clone();
        let interval = Duration::from_secs(self.config.ping_interval_secs.max(1));
        services.spawn(NAME, monitor(pool, interval, stop));

        self.state.finish_start();
        tracing::info!(subsystem = NAME, database = %self.url, "{}", MSG_STARTED);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.state.begin_stop()?;
        tracing::debug!(subsystem = NAME, "{}", MSG_SHUTTING_DOWN);

        self.stop.notify_one();
        self.pool.write().take();

        self.state.finish_stop();
        tracing::debug!(subsystem = NAME, "{}", MSG_SHUTDOWN);
        Ok(())
    }
}

/// Pings the pool until told to stop.
async fn monitor(pool: DbPool, interval: Duration, stop: Arc<Notify>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.notified() => break,
            _ = ticker.tick() => {
                let pool = pool.clone();
                match tokio::task::spawn_blocking(move || connection::ping(&pool)).await {
                    Ok(Ok(())) => tracing::trace!("Database ping ok"),
                    Ok(Err(e)) => tracing::warn!(error = %e, "Database ping failed"),
                    Err(e) => tracing::error!(error = %e, "Database ping task failed"),
                }
            }
        }
    }
}
