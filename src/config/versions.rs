//! Config schema migrations.
//!
//! Each [`ConfigVersion`] upgrades the raw JSON document from the previous
//! version. [`VersionManager::deploy`] applies every step above the document's
//! current `version` in order and stamps the new version after each one.
//! Documents already at the latest version pass through byte for byte.

use serde_json::{Map, Value};

use crate::config::error::ConfigError;

/// Highest version this build understands.
pub const LATEST_VERSION: u32 = 3;

/// One schema upgrade step.
pub trait ConfigVersion: Send + Sync {
    /// Version the document has after this step.
    fn version(&self) -> u32;

    fn upgrade(&self, doc: &mut Map<String, Value>) -> Result<(), ConfigError>;
}

/// Ordered set of upgrade steps.
pub struct VersionManager {
    versions: Vec<Box<dyn ConfigVersion>>,
}

impl VersionManager {
    /// Builds a manager from steps numbered 1, 2, 3, ... in order.
    pub fn new(versions: Vec<Box<dyn ConfigVersion>>) -> Result<Self, ConfigError> {
        for (index, step) in versions.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.version() != expected {
                return Err(ConfigError::Migration {
                    version: step.version(),
                    reason: format!("expected version {expected} at position {index}"),
                });
            }
        }
        Ok(Self { versions })
    }

    /// The migrations shipped with this build.
    pub fn standard() -> Self {
        Self {
            versions: vec![
                Box::new(RemoteControlCredentials),
                Box::new(NamedEncryptionMode),
                Box::new(TimeoutInSeconds),
            ],
        }
    }

    pub fn latest(&self) -> u32 {
        self.versions.last().map_or(0, |v| v.version())
    }

    /// Upgrades a serialized document to the latest version.
    pub fn deploy(&self, data: &[u8]) -> Result<Vec<u8>, ConfigError> {
        let mut value: Value = serde_json::from_slice(data)?;
        let doc = value
            .as_object_mut()
            .ok_or_else(|| ConfigError::Malformed("top level is not an object".to_string()))?;

        let current = match doc.get("version") {
            None => 0,
            Some(v) => {
                let raw = v
                    .as_u64()
                    .ok_or_else(|| ConfigError::Malformed("version is not a number".to_string()))?;
                u32::try_from(raw)
                    .map_err(|_| ConfigError::Malformed(format!("version {raw} out of range")))?
            }
        };

        let latest = self.latest();
        if current > latest {
            return Err(ConfigError::UnsupportedVersion {
                found: current,
                latest,
            });
        }
        if current == latest {
            return Ok(data.to_vec());
        }

        for step in self.versions.iter().filter(|v| v.version() > current) {
            step.upgrade(doc)?;
            doc.insert("version".to_string(), Value::from(step.version()));
            tracing::info!(version = step.version(), "Config upgraded");
        }

        serde_json::to_vec_pretty(&value).map_err(ConfigError::Serialize)
    }
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::standard()
    }
}

/// v1: top-level `rpcUsername` / `rpcPassword` move under `remoteControl`.
struct RemoteControlCredentials;

impl ConfigVersion for RemoteControlCredentials {
    fn version(&self) -> u32 {
        1
    }

    fn upgrade(&self, doc: &mut Map<String, Value>) -> Result<(), ConfigError> {
        let username = doc.remove("rpcUsername");
        let password = doc.remove("rpcPassword");
        if username.is_none() && password.is_none() {
            return Ok(());
        }

        let remote = doc
            .entry("remoteControl")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| ConfigError::Migration {
                version: 1,
                reason: "remoteControl is not an object".to_string(),
            })?;

        for (key, value) in [("username", username), ("password", password)] {
            if let Some(value) = value {
                remote.entry(key).or_insert(value);
            }
        }
        Ok(())
    }
}

/// v2: integer `encryptConfig` (0 prompt, 1 enabled, -1 disabled) becomes a name.
struct NamedEncryptionMode;

impl ConfigVersion for NamedEncryptionMode {
    fn version(&self) -> u32 {
        2
    }

    fn upgrade(&self, doc: &mut Map<String, Value>) -> Result<(), ConfigError> {
        let Some(mode) = doc.get("encryptConfig").and_then(Value::as_i64) else {
            return Ok(());
        };
        let name = match mode {
            0 => "prompt",
            1 => "enabled",
            -1 => "disabled",
            other => {
                return Err(ConfigError::Migration {
                    version: 2,
                    reason: format!("unknown encryptConfig value {other}"),
                })
            }
        };
        doc.insert("encryptConfig".to_string(), Value::from(name));
        Ok(())
    }
}

/// v3: `globalHTTPTimeout` in nanoseconds becomes `globalHttpTimeoutSecs`.
struct TimeoutInSeconds;

impl ConfigVersion for TimeoutInSeconds {
    fn version(&self) -> u32 {
        3
    }

    fn upgrade(&self, doc: &mut Map<String, Value>) -> Result<(), ConfigError> {
        if let Some(nanos) = doc.remove("globalHTTPTimeout") {
            let secs = nanos.as_i64().unwrap_or(0) / 1_000_000_000;
            doc.entry("globalHttpTimeoutSecs").or_insert(Value::from(secs));
        }
        Ok(())
    }
}
