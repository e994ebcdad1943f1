//! Delta Exchange options integration for the straddle/strangle engine.
//!
//! This crate provides:
//! - REST client with rate limiting for the Delta Exchange India API
//! - HMAC-SHA256 request signing
//! - Option symbol parsing and expiry-bucket resolution
//! - A paper gateway with scripted market data and simulated fills
//!
//! Both [`DeltaClient`] and [`PaperGateway`] implement
//! [`straddle_core::MarketGateway`].
//!
//! # Example
//!
//! ```ignore
//! use straddle_core::{MarketGateway, RetryConfig, RetryingGateway};
//! use straddle_delta::{DeltaClient, DeltaClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DeltaClient::new(DeltaClientConfig::default())?;
//!     let gateway = RetryingGateway::new(client, RetryConfig::default());
//!
//!     let balance = gateway.get_wallet_balance("USD").await?;
//!     println!("available: {}", balance.available);
//!     Ok(())
//! }
//! ```
//!
//! # Authentication
//!
//! Set the following environment variables (names are configurable):
//!
//! - `DELTA_API_KEY`: Your API key
//! - `DELTA_API_SECRET`: Your API secret
//!
//! # API Endpoints
//!
//! - `GET /v2/tickers/{symbol}` - Mark price (spot is read from `{UNDERLYING}USD`)
//! - `GET /v2/products` - Live option listings
//! - `GET /v2/wallet/balances` - Wallet balances
//! - `POST /v2/orders` - Submit order
//! - `GET /v2/orders/{id}` - Get order status
//! - `DELETE /v2/orders/{id}` - Cancel order

pub mod auth;
pub mod client;
pub mod error;
pub mod expiry;
pub mod paper;
mod types;

pub use auth::{DeltaAuth, DeltaAuthConfig, SignedHeaders};
pub use client::{DeltaClient, DeltaClientConfig, DELTA_INDIA_TESTNET_URL, DELTA_INDIA_URL};
pub use error::{DeltaError, Result};
pub use expiry::{expiry_tag, parse_option_symbol, resolve_expiry, ParsedSymbol};
pub use paper::{PaperGateway, PaperGatewayConfig};
