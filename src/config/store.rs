//! The in-process config store.
//!
//! One authoritative [`ConfigDocument`] lives behind a mutex. Loading
//! decrypts and migrates; saving serializes and, when encryption is enabled,
//! seals the payload with the session key. Operator prompts never happen
//! while the document lock is held.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::encryption::{self, SessionKey};
use crate::config::error::ConfigError;
use crate::config::loader;
use crate::config::prompt::{Prompter, TerminalPrompter};
use crate::config::schema::{ConfigDocument, EncryptionMode};
use crate::config::validation::check_config;
use crate::config::versions::VersionManager;

pub struct ConfigStore {
    document: Mutex<ConfigDocument>,
    session: Mutex<Option<SessionKey>>,
    prompter: Arc<dyn Prompter>,
    versions: VersionManager,
}

impl ConfigStore {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self::with_document(ConfigDocument::default(), prompter)
    }

    pub fn with_document(document: ConfigDocument, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            document: Mutex::new(document),
            session: Mutex::new(None),
            prompter,
            versions: VersionManager::standard(),
        }
    }

    /// Snapshot of the current document.
    pub fn get(&self) -> ConfigDocument {
        self.document.lock().clone()
    }

    pub fn set(&self, document: ConfigDocument) {
        *self.document.lock() = document;
    }

    /// Mutates the document in place under the lock.
    pub fn update_with<R>(&self, f: impl FnOnce(&mut ConfigDocument) -> R) -> R {
        f(&mut self.document.lock())
    }

    pub fn has_session_key(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Reads the config at `path` (or the resolved default) and checks it.
    pub fn load(&self, path: &str, dry_run: bool) -> Result<PathBuf, ConfigError> {
        let resolved = self.read_from_file(path, dry_run)?;
        self.check()?;
        Ok(resolved)
    }

    /// Reads, decrypts and migrates the config; may ask about encryption.
    pub fn read_from_file(&self, path: &str, dry_run: bool) -> Result<PathBuf, ConfigError> {
        let (resolved, _) = loader::resolve_path(path)?;
        self.read_resolved(&resolved, dry_run)
            .map_err(|source| ConfigError::Load {
                path: resolved.clone(),
                source: Box::new(source),
            })?;
        Ok(resolved)
    }

    fn read_resolved(&self, path: &Path, dry_run: bool) -> Result<(), ConfigError> {
        let data = fs::read(path).map_err(|e| ConfigError::io(path, e))?;
        let encrypted_on_disk = encryption::is_encrypted(&data);

        let document = self.decode(&data)?;
        let mode = document.encrypt_config;
        self.set(document);

        if dry_run || mode != EncryptionMode::Prompt || encrypted_on_disk {
            return Ok(());
        }
        self.save_with_encrypt_prompt(path)
    }

    /// Decrypts if needed, migrates, then deserializes.
    fn decode(&self, data: &[u8]) -> Result<ConfigDocument, ConfigError> {
        let plaintext = if encryption::is_encrypted(data) {
            let (plaintext, key) = encryption::decrypt(data, self.prompter.as_ref())?;
            *self.session.lock() = Some(key);
            plaintext
        } else {
            data.to_vec()
        };

        let migrated = self.versions.deploy(&plaintext)?;
        Ok(serde_json::from_slice(&migrated)?)
    }

    fn save_with_encrypt_prompt(&self, path: &Path) -> Result<(), ConfigError> {
        match self.prompter.confirm_encryption() {
            Ok(true) => {
                self.update_with(|doc| doc.encrypt_config = EncryptionMode::Enabled);
            }
            Ok(false) => {
                self.update_with(|doc| doc.encrypt_config = EncryptionMode::Disabled);
            }
            Err(e) => {
                self.update_with(|doc| doc.encrypt_config = EncryptionMode::Disabled);
                tracing::warn!(
                    security = true,
                    path = %path.display(),
                    error = %e,
                    "Encryption prompt failed, saving config unencrypted"
                );
            }
        }
        self.save_to_file(path)
    }

    /// Saves to `path`, readable only by the owner on unix.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        self.save_with(|| {
            let mut options = OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            options.open(path)
        })?;
        tracing::info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Serializes (and encrypts when enabled), then writes to the writer
    /// returned by `provider`. The provider is only invoked once the payload
    /// is ready, so a failed encryption never truncates the destination.
    pub fn save_with<W, F>(&self, provider: F) -> Result<(), ConfigError>
    where
        W: Write,
        F: FnOnce() -> io::Result<W>,
    {
        let (payload, mode) = {
            let doc = self.document.lock();
            let payload = serde_json::to_vec_pretty(&*doc).map_err(ConfigError::Serialize)?;
            (payload, doc.encrypt_config)
        };

        let payload = if mode == EncryptionMode::Enabled {
            let key = self.session_key()?;
            encryption::encrypt(&key, &payload)?
        } else {
            payload
        };

        let mut writer = provider().map_err(ConfigError::Write)?;
        writer.write_all(&payload).map_err(ConfigError::Write)?;
        writer.flush().map_err(ConfigError::Write)
    }

    /// Cached session key, prompting for a new passphrase on first use.
    fn session_key(&self) -> Result<SessionKey, ConfigError> {
        if let Some(key) = self.session.lock().clone() {
            return Ok(key);
        }

        let passphrase = self.prompter.passphrase(true)?;
        if passphrase.is_empty() {
            return Err(ConfigError::EmptyPassphrase);
        }
        let key = SessionKey::derive(passphrase.as_bytes())?;
        Ok(self.session.lock().get_or_insert(key).clone())
    }

    /// Runs config checks against the stored document.
    pub fn check(&self) -> Result<(), ConfigError> {
        check_config(&mut self.document.lock())
    }

    /// Accepts `new` after checking it, persists unless `dry_run`, then
    /// reloads from `path`.
    pub fn update(
        &self,
        path: &Path,
        mut new: ConfigDocument,
        dry_run: bool,
    ) -> Result<(), ConfigError> {
        check_config(&mut new)?;

        self.update_with(|doc| {
            doc.name = new.name;
            doc.encrypt_config = new.encrypt_config;
            doc.global_http_timeout_secs = new.global_http_timeout_secs;
        });

        if !dry_run {
            self.save_to_file(path)?;
        }
        self.load(&path.display().to_string(), dry_run).map(|_| ())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Arc::new(TerminalPrompter))
    }
}
