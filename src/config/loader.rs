//! Configuration file discovery.
//!
//! # Search order
//! ```text
//! explicit path (returned verbatim)
//!     → <exe dir>/config.json
//!     → <exe dir>/config.dat
//!     → <data dir>/config.json
//!     → <data dir>/config.dat
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::encryption;
use crate::config::error::ConfigError;

/// Plaintext config file name.
pub const CONFIG_FILE: &str = "config.json";

/// Encrypted config file name.
pub const ENCRYPTED_CONFIG_FILE: &str = "config.dat";

/// Per-user data directory: `$HOME/.trading-daemon`, or
/// `%APPDATA%\TradingDaemon` on Windows.
pub fn default_data_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("TradingDaemon")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trading-daemon")
    }
}

fn executable_dir() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe().map_err(ConfigError::Executable)?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Resolves the config file to use.
///
/// Returns the path and whether it was found implicitly (not given).
pub fn resolve_path(explicit: &str) -> Result<(PathBuf, bool), ConfigError> {
    if !explicit.is_empty() {
        return Ok((PathBuf::from(explicit), false));
    }
    resolve_path_in(&executable_dir()?, &default_data_dir())
}

/// Searches `exe_dir` and then `data_dir` for a config file.
pub fn resolve_path_in(exe_dir: &Path, data_dir: &Path) -> Result<(PathBuf, bool), ConfigError> {
    let candidates = [
        exe_dir.join(CONFIG_FILE),
        exe_dir.join(ENCRYPTED_CONFIG_FILE),
        data_dir.join(CONFIG_FILE),
        data_dir.join(ENCRYPTED_CONFIG_FILE),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .map(|path| (path, true))
        .ok_or_else(|| ConfigError::NotFound {
            data_dir: data_dir.to_path_buf(),
        })
}

/// Resolves the config path and, when it was found implicitly outside the
/// data directory, moves it there.
pub fn get_and_migrate_default_path(explicit: &str) -> Result<PathBuf, ConfigError> {
    let (path, implicit) = resolve_path(explicit)?;
    if !implicit {
        return Ok(path);
    }
    migrate_config(&path, &default_data_dir())
}

/// Moves `file` into `target_dir` under its canonical name.
///
/// A file already inside `target_dir` stays where it is. An existing target
/// is never overwritten; the source is used as-is in that case.
pub fn migrate_config(file: &Path, target_dir: &Path) -> Result<PathBuf, ConfigError> {
    if file.parent() == Some(target_dir) {
        return Ok(file.to_path_buf());
    }

    let name = if encryption::is_file_encrypted(file) {
        ENCRYPTED_CONFIG_FILE
    } else {
        CONFIG_FILE
    };
    let target = target_dir.join(name);

    if target.exists() {
        tracing::warn!(
            source = %file.display(),
            target = %target.display(),
            "Config already present in data directory, not migrating"
        );
        return Ok(file.to_path_buf());
    }

    fs::create_dir_all(target_dir).map_err(|e| ConfigError::io(target_dir, e))?;

    // rename fails across filesystems; fall back to copy and remove.
    if fs::rename(file, &target).is_err() {
        fs::copy(file, &target).map_err(|e| ConfigError::io(&target, e))?;
        fs::remove_file(file).map_err(|e| ConfigError::io(file, e))?;
    }

    tracing::info!(
        source = %file.display(),
        target = %target.display(),
        "Config file migrated to data directory"
    );
    Ok(target)
}
