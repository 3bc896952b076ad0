//! Operator prompts used by the config store.
//!
//! Passphrase entry and the "encrypt this config?" question go through the
//! [`Prompter`] trait so the store can be driven without a terminal.

use std::io::IsTerminal;

use dialoguer::Confirm;
use zeroize::Zeroizing;

use crate::config::error::ConfigError;

/// Source of operator input.
pub trait Prompter: Send + Sync {
    /// Returns a passphrase. With `confirm`, the operator enters it twice.
    fn passphrase(&self, confirm: bool) -> Result<Zeroizing<String>, ConfigError>;

    /// Asks whether the config should be stored encrypted.
    fn confirm_encryption(&self) -> Result<bool, ConfigError>;
}

/// Interactive prompter reading from the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn require_terminal() -> Result<(), ConfigError> {
        if std::io::stdin().is_terminal() {
            Ok(())
        } else {
            Err(ConfigError::Prompt("stdin is not a terminal".to_string()))
        }
    }
}

impl Prompter for TerminalPrompter {
    fn passphrase(&self, confirm: bool) -> Result<Zeroizing<String>, ConfigError> {
        Self::require_terminal()?;

        let first = Zeroizing::new(
            rpassword::prompt_password("Enter config encryption key: ")
                .map_err(|e| ConfigError::Prompt(e.to_string()))?,
        );
        if first.is_empty() {
            return Err(ConfigError::EmptyPassphrase);
        }
        if !confirm {
            return Ok(first);
        }

        let second = Zeroizing::new(
            rpassword::prompt_password("Re-enter config encryption key: ")
                .map_err(|e| ConfigError::Prompt(e.to_string()))?,
        );
        if *first != *second {
            return Err(ConfigError::PassphraseMismatch);
        }
        Ok(first)
    }

    fn confirm_encryption(&self) -> Result<bool, ConfigError> {
        Self::require_terminal()?;

        Confirm::new()
            .with_prompt("Would you like to encrypt your config file?")
            .default(false)
            .interact()
            .map_err(|e| ConfigError::Prompt(e.to_string()))
    }
}
