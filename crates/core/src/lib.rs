//! Core types, gateway trait, and configuration for the straddle/strangle engine.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::{
    AppConfig, DeltaConfig, ExecutionConfig, MonitorConfig, RetryConfig, StrikeConfig,
};
pub use config_loader::ConfigLoader;
pub use error::GatewayError;
pub use retry::RetryingGateway;
pub use traits::MarketGateway;
pub use types::{
    Contract, ExpiryClass, OptionChain, OptionKind, OrderHandle, OrderKind, OrderRequest,
    OrderState, Side, SpotQuote, WalletBalance,
};
