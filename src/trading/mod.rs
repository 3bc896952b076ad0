//! Trading services the RPC handlers call into.
//!
//! # Data Flow
//! ```text
//! RPC handler
//!     → AccountService (database rows, RSA account cipher)
//!     → TokenPriceSource (swap-route quote API)
//!     → Forwarder (address file → batches → BatchSender)
//! ```
//!
//! # Design Decisions
//! - Each service is a trait object so handlers can be tested with fakes
//! - Transaction construction lives behind `BatchSender`; no sender is
//!   registered by default

pub mod account;
pub mod forward;
pub mod price;

use std::sync::Arc;

pub use account::{Account, AccountError, AccountManager, AccountService};
pub use forward::{BatchForwarder, BatchSender, ForwardError, ForwardSettings, Forwarder};
pub use price::{PriceError, TokenPrice, TokenPriceClient, TokenPriceSource};

/// The services handed to the RPC layer.
#[derive(Clone)]
pub struct TradingServices {
    pub accounts: Arc<dyn AccountService>,
    pub prices: Arc<dyn TokenPriceSource>,
    pub forwarder: Arc<dyn Forwarder>,
}
