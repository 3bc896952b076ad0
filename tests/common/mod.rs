//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use trading_daemon::config::{ConfigError, EncryptionMode, Prompter};
use trading_daemon::trading::forward::{SolTransfer, TokenTransfer};
use trading_daemon::trading::{
    Account, AccountError, AccountService, ForwardError, Forwarder, PriceError, TokenPrice,
    TokenPriceSource, TradingServices,
};
use trading_daemon::ConfigDocument;
use zeroize::Zeroizing;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "Password";

/// Prompter for runs without an operator.
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn passphrase(&self, _confirm: bool) -> Result<Zeroizing<String>, ConfigError> {
        Err(ConfigError::Prompt("no operator".to_string()))
    }

    fn confirm_encryption(&self) -> Result<bool, ConfigError> {
        Err(ConfigError::Prompt("no operator".to_string()))
    }
}

/// Operator that always agrees to encrypt and counts every question.
#[derive(Default)]
pub struct CountingPrompter {
    pub passphrase_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
}

impl Prompter for CountingPrompter {
    fn passphrase(&self, _confirm: bool) -> Result<Zeroizing<String>, ConfigError> {
        self.passphrase_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Zeroizing::new("operator-secret".to_string()))
    }

    fn confirm_encryption(&self) -> Result<bool, ConfigError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

/// Plaintext config rooted at `dir` with every subsystem switched off.
pub fn quiet_document(dir: &Path) -> ConfigDocument {
    let mut doc = ConfigDocument {
        data_directory: dir.display().to_string(),
        encrypt_config: EncryptionMode::Disabled,
        ..Default::default()
    };
    doc.logging.enabled = Some(false);
    doc.logging.output = "console".to_string();
    doc.remote_control.username = USERNAME.to_string();
    doc.remote_control.password = PASSWORD.to_string();
    doc.remote_control.rpc.enabled = false;
    doc.remote_control.rpc.gateway_enabled = false;
    doc.remote_control.rpc.listen_address = "127.0.0.1:0".to_string();
    doc.remote_control.rpc.gateway_listen_address = "127.0.0.1:0".to_string();
    doc
}

/// Writes `doc` as `config.json` under `dir` and returns its path.
pub fn write_config(dir: &Path, doc: &ConfigDocument) -> String {
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_vec_pretty(doc).unwrap()).unwrap();
    path.display().to_string()
}

pub struct StaticAccounts;

#[async_trait]
impl AccountService for StaticAccounts {
    async fn accounts(&self) -> Result<Vec<Account>, AccountError> {
        Ok(vec![account()])
    }

    async fn account_by_id(&self, _id: i32) -> Result<Account, AccountError> {
        Ok(account())
    }

    async fn account_by_name(&self, _name: &str) -> Result<Account, AccountError> {
        Ok(account())
    }

    async fn private_key(&self, address: &str) -> Result<Zeroizing<String>, AccountError> {
        Ok(Zeroizing::new(format!("key-of-{address}")))
    }

    async fn crypto(&self, plaintext: &str) -> Result<String, AccountError> {
        Ok(format!("sealed({plaintext})"))
    }
}

pub fn account() -> Account {
    Account {
        id: 1,
        name: "main".to_string(),
        address: "Addr1111".to_string(),
        exchange_address_id: String::new(),
        zk_address_id: String::new(),
        f4_address_id: String::new(),
        ot_address_id: String::new(),
        cipher: "c1".to_string(),
        layer: 1,
        owner: "ops".to_string(),
        chain_name: "solana".to_string(),
        created_at: String::new(),
        updated_at: String::new(),
    }
}

pub struct FixedPrice;

#[async_trait]
impl TokenPriceSource for FixedPrice {
    async fn token_price(&self, token_address: &str) -> Result<TokenPrice, PriceError> {
        if token_address.is_empty() {
            return Err(PriceError::EmptyAddress);
        }
        Ok(TokenPrice {
            address: token_address.to_string(),
            usd_price: 2.0,
            sol_price: 75.0,
            last_update: chrono::Utc::now(),
        })
    }
}

pub struct EchoForwarder;

#[async_trait]
impl Forwarder for EchoForwarder {
    async fn transfer_sol(&self, request: SolTransfer) -> Result<Vec<String>, ForwardError> {
        Ok(request.addresses.iter().map(|a| format!("sol->{a}")).collect())
    }

    async fn transfer_token(&self, request: TokenTransfer) -> Result<Vec<String>, ForwardError> {
        Ok(request
            .addresses
            .iter()
            .map(|a| format!("{}->{a}", request.token_mint))
            .collect())
    }
}

pub fn fake_services() -> TradingServices {
    TradingServices {
        accounts: Arc::new(StaticAccounts),
        prices: Arc::new(FixedPrice),
        forwarder: Arc::new(EchoForwarder),
    }
}

/// HTTPS client trusting only the daemon's self-signed certificate.
pub fn tls_client(data_dir: &Path) -> reqwest::Client {
    trading_daemon::net::tls::install_crypto_provider();
    let cert = trading_daemon::net::certs::cert_path(&data_dir.join("tls"));
    reqwest::Client::builder()
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .add_root_certificate(trading_daemon::net::tls::load_root_certificate(&cert).unwrap())
        .build()
        .unwrap()
}
