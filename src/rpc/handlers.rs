//! RPC method handlers.
//!
//! Every method validates its request fields before touching a trading
//! service; service failures come back wrapped with the operation name.

use std::sync::Arc;

use axum::extract::State;
use axum::middleware;
use axum::routing::post;
use axum::{Extension, Json, Router};
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;

use crate::config::ConfigStore;
use crate::database::DatabaseError;
use crate::rpc::error::{RpcCode, RpcError};
use crate::rpc::pipeline::{pipeline_middleware, CallContext, Pipeline};
use crate::rpc::types::*;
use crate::trading::forward::{read_addresses_from_file, SolTransfer, TokenTransfer};
use crate::trading::{AccountError, ForwardError, PriceError, TradingServices};

pub const SHUTDOWN_NOT_ALLOWED: &str = "shutting down this instance is not allowed via RPC";

fn account_code(err: &AccountError) -> RpcCode {
    match err {
        AccountError::Database(DatabaseError::SupportDisabled) => RpcCode::Unavailable,
        AccountError::NotFound(_) => RpcCode::NotFound,
        _ => RpcCode::Internal,
    }
}

fn forward_code(err: &ForwardError) -> RpcCode {
    match err {
        ForwardError::Unavailable => RpcCode::Unavailable,
        ForwardError::NoRecipients => RpcCode::InvalidArgument,
        _ => RpcCode::Internal,
    }
}

fn price_code(err: &PriceError) -> RpcCode {
    match err {
        PriceError::EmptyAddress => RpcCode::InvalidArgument,
        PriceError::Request(_) | PriceError::Status { .. } | PriceError::Api(_) => {
            RpcCode::Unavailable
        }
        _ => RpcCode::Internal,
    }
}

/// Handler state shared by every call.
#[derive(Clone)]
pub struct RpcService {
    services: TradingServices,
    config: Arc<ConfigStore>,
    allow_shutdown: bool,
    shutdown_request: Arc<Notify>,
}

impl RpcService {
    pub fn new(
        services: TradingServices,
        config: Arc<ConfigStore>,
        allow_shutdown: bool,
        shutdown_request: Arc<Notify>,
    ) -> Self {
        Self {
            services,
            config,
            allow_shutdown,
            shutdown_request,
        }
    }

    pub async fn get_accounts(&self, _ctx: &CallContext) -> Result<GetAccountsResponse, RpcError> {
        let accounts = self
            .services
            .accounts
            .accounts()
            .await
            .map_err(|e| RpcError::wrap("failed to get accounts", account_code(&e), e))?;
        Ok(GetAccountsResponse {
            accounts: accounts.into_iter().map(AccountInfo::from).collect(),
        })
    }

    pub async fn get_token_price(
        &self,
        _ctx: &CallContext,
        request: GetTokenPriceRequest,
    ) -> Result<GetTokenPriceResponse, RpcError> {
        if request.token_address.is_empty() {
            return Err(RpcError::invalid_argument("token address cannot be empty"));
        }
        let price = self
            .services
            .prices
            .token_price(&request.token_address)
            .await
            .map_err(|e| RpcError::wrap("failed to get token price", price_code(&e), e))?;
        Ok(GetTokenPriceResponse {
            token_price: price.into(),
        })
    }

    pub async fn crypto(
        &self,
        _ctx: &CallContext,
        request: CryptoRequest,
    ) -> Result<CryptoResponse, RpcError> {
        if request.plaintext.is_empty() {
            return Err(RpcError::invalid_argument("enter a partial private key"));
        }
        let ciphertext = self
            .services
            .accounts
            .crypto(&request.plaintext)
            .await
            .map_err(|e| RpcError::wrap("failed to encrypt", account_code(&e), e))?;
        Ok(CryptoResponse { ciphertext })
    }

    /// Recipients from the configured address file.
    async fn recipients(&self) -> Result<Vec<String>, RpcError> {
        let path = {
            let doc = self.config.get();
            doc.resolve_file(&doc.forward.address_file)
        };
        read_addresses_from_file(&path)
            .await
            .map_err(|e| RpcError::wrap("failed to read address list", forward_code(&e), e))
    }

    pub async fn transfer_sol(
        &self,
        ctx: &CallContext,
        request: TransferSolRequest,
    ) -> Result<TransferResponse, RpcError> {
        if request.address.is_empty() {
            return Err(RpcError::invalid_argument("address cannot be empty"));
        }

        let private_key = self
            .services
            .accounts
            .private_key(&request.address)
            .await
            .map_err(|e| RpcError::wrap("failed to get private key", account_code(&e), e))?;
        let addresses = self.recipients().await?;
        if ctx.verbose {
            tracing::info!(from = %request.address, recipients = addresses.len(), "Forwarding SOL");
        }

        let tx_signatures = self
            .services
            .forwarder
            .transfer_sol(SolTransfer {
                private_key,
                addresses,
                settings: self.config.get().forward.into(),
            })
            .await
            .map_err(|e| RpcError::wrap("failed to transfer SOL", forward_code(&e), e))?;
        Ok(TransferResponse { tx_signatures })
    }

    pub async fn transfer_token(
        &self,
        ctx: &CallContext,
        request: TransferTokenRequest,
    ) -> Result<TransferResponse, RpcError> {
        if request.address.is_empty() {
            return Err(RpcError::invalid_argument("address cannot be empty"));
        }
        if request.token_mint.is_empty() {
            return Err(RpcError::invalid_argument("token mint cannot be empty"));
        }

        let private_key = self
            .services
            .accounts
            .private_key(&request.address)
            .await
            .map_err(|e| RpcError::wrap("failed to get private key", account_code(&e), e))?;
        let addresses = self.recipients().await?;
        if ctx.verbose {
            tracing::info!(
                from = %request.address,
                mint = %request.token_mint,
                recipients = addresses.len(),
                "Forwarding token"
            );
        }

        let tx_signatures = self
            .services
            .forwarder
            .transfer_token(TokenTransfer {
                private_key,
                token_mint: request.token_mint,
                addresses,
                is_token_2022: false,
                settings: self.config.get().forward.into(),
            })
            .await
            .map_err(|e| RpcError::wrap("failed to transfer token", forward_code(&e), e))?;
        Ok(TransferResponse { tx_signatures })
    }

    pub async fn shutdown(&self, ctx: &CallContext) -> Result<ShutdownResponse, RpcError> {
        if !self.allow_shutdown {
            return Err(RpcError::permission_denied(SHUTDOWN_NOT_ALLOWED));
        }
        tracing::warn!(peer = %ctx.peer_display(), "Shutdown requested via RPC");
        self.shutdown_request.notify_one();
        Ok(ShutdownResponse {})
    }
}

async fn get_accounts(
    State(service): State<RpcService>,
    Extension(ctx): Extension<CallContext>,
) -> Result<Json<GetAccountsResponse>, RpcError> {
    service.get_accounts(&ctx).await.map(Json)
}

async fn get_token_price(
    State(service): State<RpcService>,
    Extension(ctx): Extension<CallContext>,
    Json(request): Json<GetTokenPriceRequest>,
) -> Result<Json<GetTokenPriceResponse>, RpcError> {
    service.get_token_price(&ctx, request).await.map(Json)
}

async fn crypto(
    State(service): State<RpcService>,
    Extension(ctx): Extension<CallContext>,
    Json(request): Json<CryptoRequest>,
) -> Result<Json<CryptoResponse>, RpcError> {
    service.crypto(&ctx, request).await.map(Json)
}

async fn transfer_sol(
    State(service): State<RpcService>,
    Extension(ctx): Extension<CallContext>,
    Json(request): Json<TransferSolRequest>,
) -> Result<Json<TransferResponse>, RpcError> {
    service.transfer_sol(&ctx, request).await.map(Json)
}

async fn transfer_token(
    State(service): State<RpcService>,
    Extension(ctx): Extension<CallContext>,
    Json(request): Json<TransferTokenRequest>,
) -> Result<Json<TransferResponse>, RpcError> {
    service.transfer_token(&ctx, request).await.map(Json)
}

async fn shutdown(
    State(service): State<RpcService>,
    Extension(ctx): Extension<CallContext>,
) -> Result<Json<ShutdownResponse>, RpcError> {
    service.shutdown(&ctx).await.map(Json)
}

/// `POST /rpc/{Method}` routes behind the request pipeline.
pub fn router(service: RpcService, pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route(&format!("/rpc/{METHOD_GET_ACCOUNTS}"), post(get_accounts))
        .route(&format!("/rpc/{METHOD_GET_TOKEN_PRICE}"), post(get_token_price))
        .route(&format!("/rpc/{METHOD_CRYPTO}"), post(crypto))
        .route(&format!("/rpc/{METHOD_TRANSFER_SOL}"), post(transfer_sol))
        .route(&format!("/rpc/{METHOD_TRANSFER_TOKEN}"), post(transfer_token))
        .route(&format!("/rpc/{METHOD_SHUTDOWN}"), post(shutdown))
        .with_state(service)
        .layer(middleware::from_fn_with_state(pipeline, pipeline_middleware))
        .layer(TraceLayer::new_for_http())
}
