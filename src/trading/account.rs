//! Account lookups and account-cipher operations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::database::model::AccountRow;
use crate::database::{accounts, DatabaseError, DatabaseHandle};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("account not found: {0}")]
    NotFound(String),

    #[error("unable to read cipher key {}: {source}", path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cipher key: {0}")]
    InvalidKey(String),

    #[error("cipher operation failed: {0}")]
    Cipher(String),

    #[error("account task failed: {0}")]
    Task(String),
}

/// An account as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub exchange_address_id: String,
    pub zk_address_id: String,
    pub f4_address_id: String,
    pub ot_address_id: String,
    pub cipher: String,
    pub layer: i32,
    pub owner: String,
    pub chain_name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            address: row.address,
            exchange_address_id: row.exchange_address_id,
            zk_address_id: row.zk_address_id,
            f4_address_id: row.f4_address_id,
            ot_address_id: row.ot_address_id,
            cipher: row.cipher,
            layer: row.layer,
            owner: row.owner,
            chain_name: row.chain_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn accounts(&self) -> Result<Vec<Account>, AccountError>;

    async fn account_by_id(&self, id: i32) -> Result<Account, AccountError>;

    async fn account_by_name(&self, name: &str) -> Result<Account, AccountError>;

    /// Decrypted private key of the account owning `address`.
    async fn private_key(&self, address: &str) -> Result<Zeroizing<String>, AccountError>;

    /// Encrypts `plaintext` with the account cipher key, base64 encoded.
    async fn crypto(&self, plaintext: &str) -> Result<String, AccountError>;
}

/// Database-backed account service.
pub struct AccountManager {
    database: DatabaseHandle,
    cipher_key_path: PathBuf,
}

impl AccountManager {
    pub fn new(database: DatabaseHandle, cipher_key_path: PathBuf) -> Self {
        Self {
            database,
            cipher_key_path,
        }
    }

    /// Runs a query on a pooled connection off the reactor.
    async fn query<T, F>(&self, f: F) -> Result<T, AccountError>
    where
        T: Send + 'static,
        F: FnOnce(&mut diesel::SqliteConnection) -> diesel::QueryResult<T> + Send + 'static,
    {
        let pool = self.database.pool()?;
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;
            f(&mut conn).map_err(DatabaseError::from)
        })
        .await
        .map_err(|e| AccountError::Task(e.to_string()))?
        .map_err(AccountError::from)
    }

    /// Runs a cipher-key operation on the blocking pool; the key file is
    /// read and the RSA work done off the reactor.
    async fn with_cipher_key<T, F>(&self, f: F) -> Result<T, AccountError>
    where
        T: Send + 'static,
        F: FnOnce(&RsaPrivateKey) -> Result<T, AccountError> + Send + 'static,
    {
        let path = self.cipher_key_path.clone();
        tokio::task::spawn_blocking(move || f(&cipher_key(&path)?))
            .await
            .map_err(|e| AccountError::Task(e.to_string()))?
    }
}

fn cipher_key(path: &Path) -> Result<RsaPrivateKey, AccountError> {
    let pem = Zeroizing::new(std::fs::read_to_string(path).map_err(|source| {
        AccountError::KeyFile {
            path: path.to_path_buf(),
            source,
        }
    })?);
    RsaPrivateKey::from_pkcs1_pem(&pem).map_err(|e| AccountError::InvalidKey(e.to_string()))
}

fn encrypt(key: &RsaPrivateKey, plaintext: &[u8]) -> Result<String, AccountError> {
    let sealed = RsaPublicKey::from(key)
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, plaintext)
        .map_err(|e| AccountError::Cipher(e.to_string()))?;
    Ok(STANDARD.encode(sealed))
}

fn decrypt(key: &RsaPrivateKey, encoded: &str) -> Result<Zeroizing<String>, AccountError> {
    let sealed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| AccountError::Cipher(e.to_string()))?;
    let plain = key
        .decrypt(Pkcs1v15Encrypt, &sealed)
        .map_err(|e| AccountError::Cipher(e.to_string()))?;
    String::from_utf8(plain)
        .map(Zeroizing::new)
        .map_err(|e| AccountError::Cipher(e.to_string()))
}

#[async_trait]
impl AccountService for AccountManager {
    async fn accounts(&self) -> Result<Vec<Account>, AccountError> {
        let rows = self.query(|conn| accounts::list(conn, None, None)).await?;
        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn account_by_id(&self, id: i32) -> Result<Account, AccountError> {
        self.query(move |conn| accounts::by_id(conn, id))
            .await?
            .map(Account::from)
            .ok_or_else(|| AccountError::NotFound(format!("id {id}")))
    }

    async fn account_by_name(&self, name: &str) -> Result<Account, AccountError> {
        let owned = name.to_string();
        self.query(move |conn| accounts::by_name(conn, &owned))
            .await?
            .map(Account::from)
            .ok_or_else(|| AccountError::NotFound(format!("name {name}")))
    }

    async fn private_key(&self, address: &str) -> Result<Zeroizing<String>, AccountError> {
        let owned = address.to_string();
        let account = self
            .query(move |conn| accounts::by_address(conn, &owned))
            .await?
            .ok_or_else(|| AccountError::NotFound(format!("address {address}")))?;
        self.with_cipher_key(move |key| decrypt(key, &account.cipher))
            .await
    }

    async fn crypto(&self, plaintext: &str) -> Result<String, AccountError> {
        let plaintext = Zeroizing::new(plaintext.as_bytes().to_vec());
        self.with_cipher_key(move |key| encrypt(key, &plaintext))
            .await
    }
}
