//! Configuration error type.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving, decoding or persisting config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config file at any searched location.
    #[error("config file not found in the executable directory or {}", data_dir.display())]
    NotFound { data_dir: PathBuf },

    #[error("unable to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to write config: {0}")]
    Write(#[source] std::io::Error),

    #[error("unable to determine executable directory: {0}")]
    Executable(#[source] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config serialization error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("malformed config document: {0}")]
    Malformed(String),

    #[error("config version {found} is newer than the latest supported version {latest}")]
    UnsupportedVersion { found: u32, latest: u32 },

    #[error("config migration to version {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("config encryption failed")]
    Encryption,

    #[error("encrypted config is malformed: {0}")]
    InvalidEncryptedData(&'static str),

    /// Terminal: the operator failed every passphrase attempt.
    #[error("unable to decrypt config after {attempts} attempts")]
    DecryptFailed { attempts: usize },

    #[error("operator prompt failed: {0}")]
    Prompt(String),

    #[error("passphrases do not match")]
    PassphraseMismatch,

    #[error("passphrase cannot be empty")]
    EmptyPassphrase,

    /// Wraps any failure with the path being loaded.
    #[error("failed to load config {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
