//! Config-at-rest encryption.
//!
//! # Format
//! ```text
//! ENCRYPTION_PREFIX | format version (1 byte) | salt (16) | nonce (12) | AES-256-GCM ciphertext
//! ```
//! Everything before the nonce is bound to the ciphertext as associated data.
//! The key is derived from the operator passphrase with Argon2id over the
//! embedded salt, so the same passphrase and salt always give the same key.

use std::fmt;
use std::io::Read;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::error::ConfigError;
use crate::config::prompt::Prompter;

/// Marks an encrypted config payload.
pub const ENCRYPTION_PREFIX: &[u8] = b"TRADING-DAEMON-ENCRYPTED";

const FORMAT_VERSION: u8 = 1;
pub const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = ENCRYPTION_PREFIX.len() + 1 + SALT_LEN;

/// Passphrase attempts before decryption fails for good.
pub const DECRYPT_ATTEMPTS: usize = 3;

/// Derived key plus the salt it was derived with. Memory only.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; KEY_LEN],
    salt: [u8; SALT_LEN],
}

impl SessionKey {
    /// Derives a key under a fresh random salt.
    pub fn derive(passphrase: &[u8]) -> Result<Self, ConfigError> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::derive_with_salt(passphrase, salt)
    }

    pub fn derive_with_salt(passphrase: &[u8], salt: [u8; SALT_LEN]) -> Result<Self, ConfigError> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase, &salt, &mut key)
            .map_err(|e| ConfigError::KeyDerivation(e.to_string()))?;
        Ok(Self { key, salt })
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    fn cipher(&self) -> Result<Aes256Gcm, ConfigError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| ConfigError::Encryption)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey").field("key", &"<redacted>").finish()
    }
}

/// Whether `data` carries the encrypted-config prefix.
pub fn is_encrypted(data: &[u8]) -> bool {
    data.starts_with(ENCRYPTION_PREFIX)
}

/// Checks the prefix of a file on disk without reading it whole.
pub fn is_file_encrypted(path: &Path) -> bool {
    let mut prefix = vec![0u8; ENCRYPTION_PREFIX.len()];
    std::fs::File::open(path)
        .and_then(|mut file| file.read_exact(&mut prefix))
        .map(|_| is_encrypted(&prefix))
        .unwrap_or(false)
}

fn header(salt: &[u8; SALT_LEN]) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(ENCRYPTION_PREFIX);
    header.push(FORMAT_VERSION);
    header.extend_from_slice(salt);
    header
}

/// Encrypts `plaintext` under `key`, embedding its salt.
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>, ConfigError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut out = header(key.salt());
    let ciphertext = key
        .cipher()?
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &out,
            },
        )
        .map_err(|_| ConfigError::Encryption)?;

    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Extracts the salt from an encrypted payload's header.
pub fn read_salt(data: &[u8]) -> Result<[u8; SALT_LEN], ConfigError> {
    if !is_encrypted(data) {
        return Err(ConfigError::InvalidEncryptedData("missing encryption prefix"));
    }
    if data.len() < HEADER_LEN + NONCE_LEN {
        return Err(ConfigError::InvalidEncryptedData("payload truncated"));
    }
    if data[ENCRYPTION_PREFIX.len()] != FORMAT_VERSION {
        return Err(ConfigError::InvalidEncryptedData("unknown format version"));
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&data[ENCRYPTION_PREFIX.len() + 1..HEADER_LEN]);
    Ok(salt)
}

/// Decrypts with an already derived key.
pub fn decrypt_with_key(key: &SessionKey, data: &[u8]) -> Result<Vec<u8>, ConfigError> {
    read_salt(data)?;
    let (aad, rest) = data.split_at(HEADER_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    key.cipher()?
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| ConfigError::InvalidEncryptedData("authentication failed"))
}

/// Decrypts `data`, asking `prompter` for the passphrase.
///
/// Returns the plaintext and the key that opened it. After
/// [`DECRYPT_ATTEMPTS`] wrong passphrases the call fails with
/// [`ConfigError::DecryptFailed`].
pub fn decrypt(data: &[u8], prompter: &dyn Prompter) -> Result<(Vec<u8>, SessionKey), ConfigError> {
    let salt = read_salt(data)?;

    for attempt in 1..=DECRYPT_ATTEMPTS {
        let passphrase = prompter.passphrase(false)?;
        let key = SessionKey::derive_with_salt(passphrase.as_bytes(), salt)?;
        match decrypt_with_key(&key, data) {
            Ok(plaintext) => return Ok((plaintext, key)),
            Err(_) => {
                tracing::warn!(
                    attempt,
                    remaining = DECRYPT_ATTEMPTS - attempt,
                    "Could not decrypt config with the supplied key"
                );
            }
        }
    }

    Err(ConfigError::DecryptFailed {
        attempts: DECRYPT_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zeroize::Zeroizing;

    struct FixedPrompter {
        passphrase: &'static str,
        calls: AtomicUsize,
    }

    impl Prompter for FixedPrompter {
        fn passphrase(&self, _confirm: bool) -> Result<Zeroizing<String>, ConfigError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Zeroizing::new(self.passphrase.to_string()))
        }

        fn confirm_encryption(&self) -> Result<bool, ConfigError> {
            Ok(false)
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SessionKey::derive(b"correct horse").unwrap();
        let sealed = encrypt(&key, b"{\"name\":\"bot\"}").unwrap();
        assert!(is_encrypted(&sealed));

        let prompter = FixedPrompter {
            passphrase: "correct horse",
            calls: AtomicUsize::new(0),
        };
        let (plain, recovered) = decrypt(&sealed, &prompter).unwrap();
        assert_eq!(plain, b"{\"name\":\"bot\"}");
        assert_eq!(recovered.salt(), key.salt());
        assert_eq!(prompter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_salt_same_key() {
        let salt = [7u8; SALT_LEN];
        let a = SessionKey::derive_with_salt(b"pass", salt).unwrap();
        let b = SessionKey::derive_with_salt(b"pass", salt).unwrap();
        let sealed = encrypt(&a, b"payload").unwrap();
        assert_eq!(decrypt_with_key(&b, &sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_wrong_passphrase_fails_after_three_attempts() {
        let key = SessionKey::derive(b"right").unwrap();
        let sealed = encrypt(&key, b"secret").unwrap();

        let prompter = FixedPrompter {
            passphrase: "wrong",
            calls: AtomicUsize::new(0),
        };
        let err = decrypt(&sealed, &prompter).unwrap_err();
        assert!(matches!(err, ConfigError::DecryptFailed { attempts: 3 }));
        assert_eq!(prompter.calls.load(Ordering::SeqCst), DECRYPT_ATTEMPTS);
    }

    #[test]
    fn test_tampered_header_is_rejected() {
        let key = SessionKey::derive(b"pass").unwrap();
        let mut sealed = encrypt(&key, b"secret").unwrap();
        let last_salt_byte = HEADER_LEN - 1;
        sealed[last_salt_byte] ^= 0xff;
        assert!(decrypt_with_key(&key, &sealed).is_err());
    }

    #[test]
    fn test_truncated_payload() {
        let err = read_salt(ENCRYPTION_PREFIX).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEncryptedData(_)));
        assert!(!is_encrypted(b"{}"));
    }
}
