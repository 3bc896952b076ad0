//! Token price lookups against a swap-route quote API.
//!
//! A token is priced by quoting a swap of one SOL into it: the quote gives
//! how many tokens one SOL buys and the USD value of the output side. SOL
//! itself is priced by quoting SOL into USDC.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::schema::TokenPriceConfig;

pub const SWAP_ROUTE_ENDPOINT: &str = "/defi/router/v1/sol/tx/get_swap_route";
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// One SOL in lamports.
const QUOTE_IN_AMOUNT: &str = "1000000000";

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("token address cannot be empty")]
    EmptyAddress,

    #[error("invalid quote URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("quote request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("quote API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("quote API returned error: {0}")]
    Api(String),

    #[error("failed to parse {field}: {value:?}")]
    Amount { field: &'static str, value: String },

    #[error("invalid calculation: {0} is zero")]
    Zero(&'static str),
}

/// Price of one token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenPrice {
    pub address: String,
    pub usd_price: f64,
    /// Tokens per SOL.
    pub sol_price: f64,
    pub last_update: DateTime<Utc>,
}

#[async_trait]
pub trait TokenPriceSource: Send + Sync {
    async fn token_price(&self, token_address: &str) -> Result<TokenPrice, PriceError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapRouteResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: SwapRouteData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwapRouteData {
    #[serde(default)]
    pub quote: Quote,
    #[serde(default)]
    pub amount_in_usd: String,
    #[serde(default)]
    pub amount_out_usd: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(default)]
    pub in_amount: String,
    #[serde(default)]
    pub out_amount: String,
    #[serde(default)]
    pub in_decimals: i32,
    #[serde(default)]
    pub out_decimals: i32,
}

fn parse_amount(field: &'static str, value: &str) -> Result<f64, PriceError> {
    value.trim().parse::<f64>().map_err(|_| PriceError::Amount {
        field,
        value: value.to_string(),
    })
}

/// Prices `token_address` from a SOL → token quote.
pub fn price_from_route(
    token_address: &str,
    route: &SwapRouteResponse,
) -> Result<TokenPrice, PriceError> {
    let data = &route.data;
    let amount_out_usd = parse_amount("amount_out_usd", &data.amount_out_usd)?;
    let in_amount = parse_amount("inAmount", &data.quote.in_amount)?;
    let out_amount = parse_amount("outAmount", &data.quote.out_amount)?;

    let in_sol = in_amount / 10f64.powi(data.quote.in_decimals);
    let out_tokens = out_amount / 10f64.powi(data.quote.out_decimals);
    if in_sol == 0.0 {
        return Err(PriceError::Zero("input amount"));
    }
    if out_tokens == 0.0 {
        return Err(PriceError::Zero("output amount"));
    }

    Ok(TokenPrice {
        address: token_address.to_string(),
        usd_price: amount_out_usd / out_tokens,
        sol_price: out_tokens / in_sol,
        last_update: Utc::now(),
    })
}

/// Prices SOL from a SOL → USDC quote.
pub fn sol_price_from_route(route: &SwapRouteResponse) -> Result<TokenPrice, PriceError> {
    Ok(TokenPrice {
        address: SOL_MINT.to_string(),
        usd_price: parse_amount("amount_in_usd", &route.data.amount_in_usd)?,
        sol_price: 1.0,
        last_update: Utc::now(),
    })
}

/// HTTP client for the quote API.
#[derive(Clone)]
pub struct TokenPriceClient {
    http: reqwest::Client,
    config: TokenPriceConfig,
}

impl TokenPriceClient {
    pub fn new(config: TokenPriceConfig, timeout: Duration) -> Result<Self, PriceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    async fn swap_route(&self, token_in: &str, token_out: &str) -> Result<SwapRouteResponse, PriceError> {
        let mut url = url::Url::parse(&self.config.base_url)?.join(SWAP_ROUTE_ENDPOINT)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("token_in_address", token_in)
                .append_pair("token_out_address", token_out)
                .append_pair("in_amount", QUOTE_IN_AMOUNT)
                .append_pair("from_address", &self.config.from_address)
                .append_pair("slippage", &self.config.slippage.to_string());
            if self.config.fee > 0.0 {
                query.append_pair("fee", &self.config.fee.to_string());
            }
        }

        tracing::debug!(token_in, token_out, "Requesting swap route quote");
        let response = self
            .http
            .get(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PriceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let route: SwapRouteResponse = response.json().await?;
        if route.code != 0 {
            return Err(PriceError::Api(route.msg));
        }
        Ok(route)
    }
}

#[async_trait]
impl TokenPriceSource for TokenPriceClient {
    async fn token_price(&self, token_address: &str) -> Result<TokenPrice, PriceError> {
        if token_address.is_empty() {
            return Err(PriceError::EmptyAddress);
        }
        if token_address == SOL_MINT {
            let route = self.swap_route(SOL_MINT, USDC_MINT).await?;
            return sol_price_from_route(&route);
        }
        let route = self.swap_route(SOL_MINT, token_address).await?;
        price_from_route(token_address, &route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn route(in_amount: &str, out_amount: &str, out_decimals: i32) -> SwapRouteResponse {
        serde_json::from_value(serde_json::json!({
            "code": 0,
            "msg": "success",
            "data": {
                "quote": {
                    "inAmount": in_amount,
                    "outAmount": out_amount,
                    "inDecimals": 9,
                    "outDecimals": out_decimals
                },
                "amount_in_usd": "150.0",
                "amount_out_usd": "149.5"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_price_adjusts_for_decimals() {
        // 1 SOL buys 2990 tokens (6 decimals) worth $149.50
        let price = price_from_route("Mint", &route("1000000000", "2990000000", 6)).unwrap();
        assert_eq!(price.address, "Mint");
        assert!((price.sol_price - 2990.0).abs() < 1e-9);
        assert!((price.usd_price - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_zero_output_is_rejected() {
        assert!(matches!(
            price_from_route("Mint", &route("1000000000", "0", 6)),
            Err(PriceError::Zero(_))
        ));
    }

    #[test]
    fn test_unparseable_amount() {
        assert!(matches!(
            price_from_route("Mint", &route("abc", "1", 6)),
            Err(PriceError::Amount { field: "inAmount", .. })
        ));
    }

    #[test]
    fn test_sol_price_uses_input_value() {
        let price = sol_price_from_route(&route("1000000000", "150000000", 6)).unwrap();
        assert_eq!(price.address, SOL_MINT);
        assert_eq!(price.usd_price, 150.0);
        assert_eq!(price.sol_price, 1.0);
    }

    async fn serve_quotes() -> String {
        let app = Router::new().route(
            SWAP_ROUTE_ENDPOINT,
            get(|Query(q): Query<HashMap<String, String>>| async move {
                if q.get("token_out_address").map(String::as_str) == Some("Broken") {
                    return Json(serde_json::json!({"code": 1, "msg": "no route"}));
                }
                Json(serde_json::json!({
                    "code": 0,
                    "data": {
                        "quote": {
                            "inAmount": q.get("in_amount").cloned().unwrap_or_default(),
                            "outAmount": "500000000",
                            "inDecimals": 9,
                            "outDecimals": 6
                        },
                        "amount_in_usd": "100",
                        "amount_out_usd": "100"
                    }
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_client_queries_quote_api() {
        let base_url = serve_quotes().await;
        let client = TokenPriceClient::new(
            TokenPriceConfig {
                base_url,
                ..Default::default()
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let price = client.token_price("Mint").await.unwrap();
        assert!((price.sol_price - 500.0).abs() < 1e-9);
        assert!((price.usd_price - 0.2).abs() < 1e-9);

        let sol = client.token_price(SOL_MINT).await.unwrap();
        assert_eq!(sol.usd_price, 100.0);

        assert!(matches!(client.token_price("Broken").await, Err(PriceError::Api(m)) if m == "no route"));
        assert!(matches!(client.token_price("").await, Err(PriceError::EmptyAddress)));
    }
}
