use crate::error::Result;
use crate::types::{
    ExpiryClass, OptionChain, OrderHandle, OrderRequest, SpotQuote, WalletBalance,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Authenticated access to a derivatives venue.
///
/// Implementations perform a single attempt per call. Retry and timeout
/// policy is layered on top by [`crate::retry::RetryingGateway`].
#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Gets the current spot price of an underlying (e.g. "BTC").
    ///
    /// # Errors
    /// - `GatewayError::Unavailable` - The venue has no price for the underlying
    async fn get_spot_price(&self, underlying: &str) -> Result<SpotQuote>;

    /// Lists the option contracts for the expiry the class resolves to.
    ///
    /// An empty `contracts` list means nothing is listed for the class.
    async fn get_option_chain(
        &self,
        underlying: &str,
        expiry_class: ExpiryClass,
    ) -> Result<OptionChain>;

    /// Gets the current mark price of a contract.
    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal>;

    /// Submits an order.
    ///
    /// Not idempotent: a repeated call is a second live order.
    ///
    /// # Errors
    /// - `GatewayError::Rejected` - Venue refused the order
    /// - `GatewayError::Ambiguous` - Submission outcome unknown
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderHandle>;

    /// Gets the current state of an order.
    async fn get_order_status(&self, order_id: &str) -> Result<OrderHandle>;

    /// Cancels a resting order.
    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Gets the wallet balance for a settlement asset.
    async fn get_wallet_balance(&self, asset: &str) -> Result<WalletBalance>;
}

#[async_trait]
impl<G: MarketGateway + ?Sized> MarketGateway for Arc<G> {
    async fn get_spot_price(&self, underlying: &str) -> Result<SpotQuote> {
        (**self).get_spot_price(underlying).await
    }

    async fn get_option_chain(
        &self,
        underlying: &str,
        expiry_class: ExpiryClass,
    ) -> Result<OptionChain> {
        (**self).get_option_chain(underlying, expiry_class).await
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal> {
        (**self).get_mark_price(symbol).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderHandle> {
        (**self).place_order(order).await
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderHandle> {
        (**self).get_order_status(order_id).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        (**self).cancel_order(order_id).await
    }

    async fn get_wallet_balance(&self, asset: &str) -> Result<WalletBalance> {
        (**self).get_wallet_balance(asset).await
    }
}
