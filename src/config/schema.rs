//! Configuration schema definitions.
//!
//! This module defines the persisted configuration document for the daemon.
//! All types derive Serde traits; keys are camelCase on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::versions::LATEST_VERSION;

/// Fallback for a non-positive `globalHttpTimeoutSecs`.
pub const DEFAULT_HTTP_TIMEOUT_SECS: i64 = 15;

/// Default log rotation threshold in megabytes.
pub const DEFAULT_LOG_MAX_SIZE_MB: i64 = 100;

/// Default log file name under `<data dir>/logs`.
pub const DEFAULT_LOG_FILE_NAME: &str = "log.txt";

/// Config encryption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// Never encrypt.
    Disabled,
    /// Ask the operator on the next interactive load.
    #[default]
    Prompt,
    /// Always save encrypted.
    Enabled,
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigDocument {
    /// Schema version, advanced by the migration pipeline.
    pub version: u32,

    /// Instance name, used in log lines and by the CLI.
    pub name: String,

    /// Overrides the per-user data directory when non-empty.
    pub data_directory: String,

    pub encrypt_config: EncryptionMode,

    /// Timeout applied to outbound HTTP calls (seconds).
    pub global_http_timeout_secs: i64,

    pub logging: LoggingConfig,

    pub remote_control: RemoteControlConfig,

    pub database: DatabaseConfig,

    pub accounts: AccountsConfig,

    pub forward: ForwardConfig,

    pub token_price: TokenPriceConfig,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            version: LATEST_VERSION,
            name: "trading-daemon".to_string(),
            data_directory: String::new(),
            encrypt_config: EncryptionMode::default(),
            global_http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            logging: LoggingConfig::default(),
            remote_control: RemoteControlConfig::default(),
            database: DatabaseConfig::default(),
            accounts: AccountsConfig::default(),
            forward: ForwardConfig::default(),
            token_price: TokenPriceConfig::default(),
        }
    }
}

impl ConfigDocument {
    /// Base data directory: the configured override or the per-user default.
    pub fn data_dir(&self) -> PathBuf {
        if self.data_directory.is_empty() {
            crate::config::loader::default_data_dir()
        } else {
            PathBuf::from(&self.data_directory)
        }
    }

    /// Joins `elems` onto the data directory.
    pub fn data_path(&self, elems: &[&str]) -> PathBuf {
        elems
            .iter()
            .fold(self.data_dir(), |path, elem| path.join(elem))
    }

    /// Global HTTP timeout as a duration. Non-positive values map to zero.
    pub fn global_http_timeout(&self) -> Duration {
        Duration::from_secs(self.global_http_timeout_secs.max(0) as u64)
    }

    /// Resolves a config-relative file path against the data directory.
    pub fn resolve_file(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}

/// Logging settings.
///
/// An absent section deserializes with `enabled: None`, which config checks
/// replace with [`LoggingConfig::system_default`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    pub enabled: Option<bool>,

    /// Filter directive, e.g. "info" or "trading_daemon=debug".
    pub level: String,

    /// "console" or "file".
    pub output: String,

    /// Emit JSON lines instead of human-readable output.
    pub structured: bool,

    pub file: Option<LoggerFileConfig>,
}

impl LoggingConfig {
    pub fn system_default() -> Self {
        Self {
            enabled: Some(true),
            level: "info".to_string(),
            output: "console".to_string(),
            structured: false,
            file: Some(LoggerFileConfig::default()),
        }
    }

    pub fn writes_to_file(&self) -> bool {
        self.output.eq_ignore_ascii_case("file")
    }
}

/// Log file settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerFileConfig {
    pub file_name: String,
    /// Roll the log file daily.
    pub rotate: Option<bool>,
    /// Validated and persisted; the appender rolls by day, not by size.
    pub max_size_mb: i64,
}

impl Default for LoggerFileConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            rotate: Some(false),
            max_size_mb: DEFAULT_LOG_MAX_SIZE_MB,
        }
    }
}

/// Remote control settings: credentials plus the RPC listeners.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteControlConfig {
    pub username: String,
    pub password: String,
    pub rpc: RpcConfig,
}

impl Default for RemoteControlConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "Password".to_string(),
            rpc: RpcConfig::default(),
        }
    }
}

/// RPC server and REST gateway listeners.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RpcConfig {
    pub enabled: bool,

    /// Bind address for the RPC server (e.g., "localhost:9052").
    pub listen_address: String,

    pub gateway_enabled: bool,

    /// Bind address for the REST gateway.
    pub gateway_listen_address: String,

    /// Whether `Shutdown` may be invoked remotely.
    pub allow_shutdown: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_address: "localhost:9052".to_string(),
            gateway_enabled: true,
            gateway_listen_address: "localhost:9053".to_string(),
            allow_shutdown: false,
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub enabled: bool,

    /// Only "sqlite3" is supported.
    pub driver: String,

    /// Database file name under `<data dir>/database`, or an absolute path.
    pub database: String,

    /// Interval between connection health pings (seconds).
    pub ping_interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            driver: "sqlite3".to_string(),
            database: "trading.db".to_string(),
            ping_interval_secs: 30,
        }
    }
}

/// Account collaborator settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountsConfig {
    /// PKCS#1 RSA private key (PEM) used for account ciphers.
    pub cipher_key_path: String,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            cipher_key_path: "keys/accounts.pem".to_string(),
        }
    }
}

/// Batch forwarding settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForwardConfig {
    /// File with one recipient address per line.
    pub address_file: String,
    pub rpc_endpoint: String,
    pub max_instructions_per_tx: usize,
    pub concurrent_txs: usize,
    pub amount_sol: f64,
    pub amount_token: f64,
    pub create_account_if_not_exist: bool,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            address_file: "addresses.txt".to_string(),
            rpc_endpoint: "https://api.mainnet-beta.solana.com".to_string(),
            max_instructions_per_tx: 10,
            concurrent_txs: 5,
            amount_sol: 0.01,
            amount_token: 100.0,
            create_account_if_not_exist: true,
        }
    }
}

/// Token price lookup settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TokenPriceConfig {
    pub base_url: String,

    /// Wallet used as the quote's sender.
    pub from_address: String,

    pub slippage: f64,
    pub fee: f64,
}

impl Default for TokenPriceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gmgn.ai".to_string(),
            from_address: "2kpJ5QRh16aRQ4oLZ5LnucHFDAZtEFz6omqWWMzDSNrx".to_string(),
            slippage: 10.0,
            fee: 0.006,
        }
    }
}
