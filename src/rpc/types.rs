//! Request and response bodies of the RPC surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trading::{Account, TokenPrice};

pub const METHOD_GET_ACCOUNTS: &str = "GetAccounts";
pub const METHOD_GET_TOKEN_PRICE: &str = "GetTokenPrice";
pub const METHOD_CRYPTO: &str = "Crypto";
pub const METHOD_TRANSFER_SOL: &str = "TransferSOL";
pub const METHOD_TRANSFER_TOKEN: &str = "TransferToken";
pub const METHOD_SHUTDOWN: &str = "Shutdown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAccountsRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
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
}

impl From<Account> for AccountInfo {
    fn from(account: Account) -> Self {
        Self {
            name: account.name,
            address: account.address,
            exchange_address_id: account.exchange_address_id,
            zk_address_id: account.zk_address_id,
            f4_address_id: account.f4_address_id,
            ot_address_id: account.ot_address_id,
            cipher: account.cipher,
            layer: account.layer,
            owner: account.owner,
            chain_name: account.chain_name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAccountsResponse {
    pub accounts: Vec<AccountInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GetTokenPriceRequest {
    pub token_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            nanos: at.timestamp_subsec_nanos() as i32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPriceInfo {
    pub address: String,
    pub usd_price: f64,
    pub sol_price: f64,
    pub last_update: Timestamp,
}

impl From<TokenPrice> for TokenPriceInfo {
    fn from(price: TokenPrice) -> Self {
        Self {
            address: price.address,
            usd_price: price.usd_price,
            sol_price: price.sol_price,
            last_update: price.last_update.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTokenPriceResponse {
    pub token_price: TokenPriceInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoRequest {
    pub plaintext: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CryptoResponse {
    pub ciphertext: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSolRequest {
    /// Sending account's address.
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferTokenRequest {
    pub address: String,
    pub token_mint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub tx_signatures: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShutdownRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShutdownResponse {}
