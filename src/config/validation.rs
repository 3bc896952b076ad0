//! Configuration checks.
//!
//! # Responsibilities
//! - Replace out-of-range values with defaults (timeouts > 0)
//! - Populate logging settings when absent
//! - Derive and create the log directory
//!
//! # Design Decisions
//! - Checks repair rather than reject; problems are logged
//! - Runs after every load and before every update is accepted

use std::path::PathBuf;

use crate::config::error::ConfigError;
use crate::config::schema::{
    ConfigDocument, LoggerFileConfig, LoggingConfig, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_LOG_FILE_NAME, DEFAULT_LOG_MAX_SIZE_MB,
};

/// Repairs `doc` in place. Logger problems are logged, not returned.
pub fn check_config(doc: &mut ConfigDocument) -> Result<(), ConfigError> {
    if let Err(e) = check_logger_config(doc) {
        tracing::error!(error = %e, "Failed to configure logger, some logging features unavailable");
    }

    if doc.global_http_timeout_secs <= 0 {
        tracing::warn!(
            configured = doc.global_http_timeout_secs,
            default = DEFAULT_HTTP_TIMEOUT_SECS,
            "Global HTTP timeout value not set or invalid, using default"
        );
        doc.global_http_timeout_secs = DEFAULT_HTTP_TIMEOUT_SECS;
    }

    let remote = &doc.remote_control;
    if remote.rpc.enabled && (remote.username.is_empty() || remote.password.is_empty()) {
        tracing::warn!("RPC enabled with empty credentials, every call will be rejected");
    }

    Ok(())
}

/// Fills in logging defaults and creates `<data dir>/logs`.
///
/// Returns the log directory.
pub fn check_logger_config(doc: &mut ConfigDocument) -> Result<PathBuf, ConfigError> {
    if doc.logging.enabled.is_none() || doc.logging.output.is_empty() {
        tracing::warn!("Missing or invalid logging config, setting defaults");
        doc.logging = LoggingConfig::system_default();
    }
    if doc.logging.level.is_empty() {
        doc.logging.level = "info".to_string();
    }

    let file = doc.logging.file.get_or_insert_with(LoggerFileConfig::default);
    if file.file_name.is_empty() {
        file.file_name = DEFAULT_LOG_FILE_NAME.to_string();
    }
    if file.rotate.is_none() {
        file.rotate = Some(false);
    }
    if file.max_size_mb <= 0 {
        tracing::warn!(
            configured = file.max_size_mb,
            default = DEFAULT_LOG_MAX_SIZE_MB,
            "Logger rotation size invalid, using default"
        );
        file.max_size_mb = DEFAULT_LOG_MAX_SIZE_MB;
    }

    let log_dir = doc.data_path(&["logs"]);
    std::fs::create_dir_all(&log_dir).map_err(|e| ConfigError::io(&log_dir, e))?;
    Ok(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_in(dir: &std::path::Path) -> ConfigDocument {
        ConfigDocument {
            data_directory: dir.display().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_non_positive_timeout_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = document_in(dir.path());
        doc.global_http_timeout_secs = -5;
        check_config(&mut doc).unwrap();
        assert_eq!(doc.global_http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS);
    }

    #[test]
    fn test_absent_logging_gets_defaults_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = document_in(dir.path());
        assert!(doc.logging.enabled.is_none());

        check_config(&mut doc).unwrap();
        assert_eq!(doc.logging, LoggingConfig::system_default());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_explicit_logging_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = document_in(dir.path());
        doc.logging = LoggingConfig {
            enabled: Some(false),
            level: "debug".to_string(),
            output: "file".to_string(),
            structured: true,
            file: None,
        };

        check_config(&mut doc).unwrap();
        assert_eq!(doc.logging.enabled, Some(false));
        assert_eq!(doc.logging.level, "debug");
        assert_eq!(doc.logging.file, Some(LoggerFileConfig::default()));
    }
}
