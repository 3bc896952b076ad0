//! The root orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

use crate::config::{get_and_migrate_default_path, ConfigError, ConfigStore, Prompter, TerminalPrompter};
use crate::database::{DatabaseConnectionManager, DatabaseHandle};
use crate::engine::services::ServiceGroup;
use crate::engine::settings::{
    resolve_parallelism, FlagSet, Settings, FLAG_DATABASE, FLAG_DATADIR, FLAG_RPC,
    FLAG_RPC_GATEWAY, FLAG_RPC_SHUTDOWN,
};
use crate::engine::subsystem::{Subsystem, SubsystemError};
use crate::observability::{init_logging, LoggerHandle, LoggingError};
use crate::rpc::{Credentials, RpcServer, RpcServerConfig, RpcService, ServerState};
use crate::trading::{
    AccountManager, BatchForwarder, PriceError, TokenPriceClient, TradingServices,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to setup global logger: {0}")]
    Logging(#[from] LoggingError),

    #[error("unable to create token price client: {0}")]
    PriceClient(#[from] PriceError),

    #[error("engine already running")]
    AlreadyRunning,
}

/// Owns the config store, the subsystems and every background task.
pub struct Engine {
    config: Arc<ConfigStore>,
    settings: Settings,
    database: DatabaseHandle,
    rpc: Mutex<Option<Arc<RpcServer>>>,
    services: ServiceGroup,
    /// Held across start and stop; the flag records whether we are running.
    lifecycle: tokio::sync::Mutex<bool>,
    logger: LoggerHandle,
    trading: TradingServices,
    shutdown_request: Arc<Notify>,
}

impl Engine {
    /// Engine over the config at its default location, with no overrides.
    pub fn new() -> Result<Self, EngineError> {
        let config = Arc::new(ConfigStore::new(Arc::new(TerminalPrompter)));
        let path = config.load("", false)?;
        let doc = config.get();

        let settings = Settings {
            config_file: path.display().to_string(),
            data_dir: doc.data_dir().display().to_string(),
            worker_threads: resolve_parallelism(0),
            http_timeout: doc.global_http_timeout(),
            global_http_timeout: doc.global_http_timeout(),
            ..Default::default()
        };
        Self::assemble(config, settings, LoggerHandle::default())
    }

    /// Engine from command-line settings, prompting on the terminal.
    pub fn new_from_settings(settings: Settings, flags: &FlagSet) -> Result<Self, EngineError> {
        Self::new_from_settings_with(settings, flags, Arc::new(TerminalPrompter))
    }

    /// Engine from command-line settings with an injected operator prompter.
    ///
    /// An explicit data directory forces dry-run so the config on disk is
    /// never rewritten with the override.
    pub fn new_from_settings_with(
        mut settings: Settings,
        flags: &FlagSet,
        prompter: Arc<dyn Prompter>,
    ) -> Result<Self, EngineError> {
        let datadir_override = flags.is_set(FLAG_DATADIR);
        let requested_dry_run = settings.enable_dry_run;
        if datadir_override {
            settings.enable_dry_run = true;
        }

        let config = Arc::new(ConfigStore::new(prompter));
        let path = get_and_migrate_default_path(&settings.config_file)?;
        config.read_from_file(&path.display().to_string(), settings.enable_dry_run)?;
        if datadir_override {
            let data_dir = settings.data_dir.clone();
            config.update_with(|doc| doc.data_directory = data_dir);
        }
        config.check()?;
        let doc = config.get();

        let logger = if doc.logging.enabled == Some(true) {
            let handle = init_logging(&doc.logging, &doc.data_path(&["logs"]))?;
            tracing::info!(name = %doc.name, "Logger initialised.");
            handle
        } else {
            LoggerHandle::default()
        };

        if datadir_override && !requested_dry_run {
            tracing::warn!("Command line argument '--datadir' induces dry run mode.");
        }
        tracing::info!(path = %path.display(), dry_run = settings.enable_dry_run, "Config loaded");

        settings.config_file = path.display().to_string();
        settings.data_dir = doc.data_dir().display().to_string();
        settings.worker_threads = resolve_parallelism(settings.max_procs);

        let rpc = &doc.remote_control.rpc;
        flags.with_bool(FLAG_DATABASE, &mut settings.enable_database_manager, doc.database.enabled);
        flags.with_bool(FLAG_RPC, &mut settings.enable_rpc, rpc.enabled);
        flags.with_bool(FLAG_RPC_GATEWAY, &mut settings.enable_rpc_gateway, rpc.gateway_enabled);
        flags.with_bool(FLAG_RPC_SHUTDOWN, &mut settings.enable_rpc_shutdown, rpc.allow_shutdown);

        if settings.http_timeout.is_zero() {
            settings.http_timeout = doc.global_http_timeout();
        }
        if settings.global_http_timeout.is_zero() {
            settings.global_http_timeout = doc.global_http_timeout();
        }

        Self::assemble(config, settings, logger)
    }

    fn assemble(
        config: Arc<ConfigStore>,
        settings: Settings,
        logger: LoggerHandle,
    ) -> Result<Self, EngineError> {
        let doc = config.get();
        let database = DatabaseHandle::new();
        let trading = TradingServices {
            accounts: Arc::new(AccountManager::new(
                database.clone(),
                doc.resolve_file(&doc.accounts.cipher_key_path),
            )),
            prices: Arc::new(TokenPriceClient::new(
                doc.token_price.clone(),
                settings.global_http_timeout,
            )?),
            forwarder: Arc::new(BatchForwarder::new()),
        };

        Ok(Self {
            config,
            settings,
            database,
            rpc: Mutex::new(None),
            services: ServiceGroup::new(),
            lifecycle: tokio::sync::Mutex::new(false),
            logger,
            trading,
            shutdown_request: Arc::new(Notify::new()),
        })
    }

    /// Replaces the trading services handed to the RPC layer.
    pub fn with_trading_services(mut self, trading: TradingServices) -> Self {
        self.trading = trading;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn database(&self) -> &DatabaseHandle {
        &self.database
    }

    pub fn services(&self) -> &ServiceGroup {
        &self.services
    }

    pub fn trading(&self) -> &TradingServices {
        &self.trading
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.logger.log_file().map(PathBuf::from)
    }

    pub fn rpc_state(&self) -> ServerState {
        self.rpc
            .lock()
            .as_ref()
            .map_or(ServerState::Unbound, |server| server.state())
    }

    pub fn rpc_local_addr(&self) -> Option<std::net::SocketAddr> {
        self.rpc.lock().as_ref().and_then(|server| server.local_addr())
    }

    pub fn gateway_local_addr(&self) -> Option<std::net::SocketAddr> {
        self.rpc.lock().as_ref().and_then(|server| server.gateway_addr())
    }

    /// Resolves once an authorised `Shutdown` call has been received.
    pub async fn wait_for_shutdown_request(&self) {
        self.shutdown_request.notified().await;
    }

    fn rpc_server(&self) -> RpcServer {
        let doc = self.config.get();
        let remote = doc.remote_control;
        let service = RpcService::new(
            self.trading.clone(),
            self.config.clone(),
            self.settings.enable_rpc_shutdown,
            self.shutdown_request.clone(),
        );
        RpcServer::new(
            RpcServerConfig {
                listen_address: remote.rpc.listen_address,
                gateway_listen_address: remote.rpc.gateway_listen_address,
                enable_gateway: self.settings.enable_rpc_gateway,
                tls_dir: PathBuf::from(&self.settings.data_dir).join("tls"),
                credentials: Credentials::new(remote.username, remote.password),
                http_timeout: self.settings.http_timeout,
            },
            service,
        )
    }

    async fn start_database(&self) {
        let doc = self.config.get();
        let manager = match DatabaseConnectionManager::setup(
            &doc.database,
            &doc.data_path(&["database"]),
        ) {
            Ok(manager) => Arc::new(manager),
            Err(e) => {
                tracing::error!(error = %e, "Database manager unable to setup");
                return;
            }
        };

        match manager.start(&self.services).await {
            Ok(()) => self.database.install(manager),
            Err(SubsystemError::DatabaseSupportDisabled) => {
                tracing::info!("Database support disabled in config, database manager not started");
            }
            Err(e) => tracing::error!(error = %e, "Database manager unable to start"),
        }
    }

    /// Starts the enabled subsystems. Subsystem failures are logged and
    /// never abort the start.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut running = self.lifecycle.lock().await;
        if *running {
            return Err(EngineError::AlreadyRunning);
        }
        tracing::debug!("Engine starting...");

        if self.settings.enable_database_manager {
            self.start_database().await;
        }

        if self.settings.enable_rpc {
            let server = Arc::new(self.rpc_server());
            // the server logs its own start failures
            let _ = server.start(&self.services).await;
            *self.rpc.lock() = Some(server);
        }

        *running = true;
        Ok(())
    }

    /// Stops every subsystem, waits for all background tasks and flushes
    /// the logger. Safe on an engine that never started.
    pub async fn stop(&self) {
        let mut running = self.lifecycle.lock().await;
        tracing::debug!("Engine shutting down..");

        if let Some(manager) = self.database.manager() {
            if manager.is_running() {
                if let Err(e) = manager.stop().await {
                    tracing::error!(error = %e, "Database manager unable to stop");
                }
            }
        }

        let rpc = self.rpc.lock().take();
        if let Some(server) = rpc {
            if server.is_running() {
                if let Err(e) = server.stop().await {
                    tracing::error!(error = %e, "RPC server unable to stop");
                }
            }
        }

        self.services.wait().await;
        *running = false;
        tracing::info!("Exiting.");
        self.logger.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ConfigDocument, EncryptionMode};

    struct NoPrompt;

    impl Prompter for NoPrompt {
        fn passphrase(&self, _confirm: bool) -> Result<zeroize::Zeroizing<String>, ConfigError> {
            Err(ConfigError::Prompt("no operator".to_string()))
        }

        fn confirm_encryption(&self) -> Result<bool, ConfigError> {
            Err(ConfigError::Prompt("no operator".to_string()))
        }
    }

    fn write_config(dir: &std::path::Path, doc: &ConfigDocument) -> String {
        let path = dir.join("config.json");
        std::fs::write(&path, serde_json::to_vec_pretty(doc).unwrap()).unwrap();
        path.display().to_string()
    }

    fn quiet_document(dir: &std::path::Path) -> ConfigDocument {
        let mut doc = ConfigDocument {
            data_directory: dir.display().to_string(),
            encrypt_config: EncryptionMode::Disabled,
            ..Default::default()
        };
        doc.logging.enabled = Some(false);
        doc.logging.output = "console".to_string();
        doc.remote_control.rpc.enabled = false;
        doc.remote_control.rpc.gateway_enabled = false;
        doc
    }

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = quiet_document(dir.path());
        doc.database.enabled = true;
        let config_file = write_config(dir.path(), &doc);

        let settings = Settings {
            config_file,
            enable_rpc: true,
            enable_database_manager: false,
            ..Default::default()
        };
        let flags: FlagSet = [FLAG_RPC, FLAG_DATABASE].into_iter().collect();
        let engine = Engine::new_from_settings_with(settings, &flags, Arc::new(NoPrompt)).unwrap();

        assert!(engine.settings().enable_rpc);
        assert!(!engine.settings().enable_database_manager);
        assert!(!engine.settings().enable_rpc_gateway);
        assert_eq!(engine.settings().http_timeout, std::time::Duration::from_secs(15));
        assert!(engine.settings().worker_threads >= 1);
    }

    #[test]
    fn test_unset_flags_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = quiet_document(dir.path());
        doc.database.enabled = true;
        doc.remote_control.rpc.allow_shutdown = true;
        let config_file = write_config(dir.path(), &doc);

        let settings = Settings {
            config_file,
            ..Default::default()
        };
        let engine =
            Engine::new_from_settings_with(settings, &FlagSet::new(), Arc::new(NoPrompt)).unwrap();
        assert!(engine.settings().enable_database_manager);
        assert!(engine.settings().enable_rpc_shutdown);
        assert!(!engine.settings().enable_rpc);
    }

    #[test]
    fn test_missing_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            config_file: dir.path().join("nope.json").display().to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Engine::new_from_settings_with(settings, &FlagSet::new(), Arc::new(NoPrompt)),
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = write_config(dir.path(), &quiet_document(dir.path()));
        let settings = Settings {
            config_file,
            ..Default::default()
        };
        let engine =
            Engine::new_from_settings_with(settings, &FlagSet::new(), Arc::new(NoPrompt)).unwrap();

        engine.start().await.unwrap();
        assert!(matches!(engine.start().await, Err(EngineError::AlreadyRunning)));
        engine.stop().await;
        engine.start().await.unwrap();
        engine.stop().await;
    }
}
