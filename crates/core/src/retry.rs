//! Timeout and retry policy for gateway calls.
//!
//! Idempotent reads are retried with exponential backoff. Order placement
//! and cancellation are attempted exactly once: a repeated submission is a
//! second live order, so an unknown outcome is surfaced as
//! [`GatewayError::Ambiguous`] instead.

use crate::config::RetryConfig;
use crate::error::{GatewayError, Result};
use crate::traits::MarketGateway;
use crate::types::{
    ExpiryClass, OptionChain, OrderHandle, OrderRequest, SpotQuote, WalletBalance,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;

/// Wraps a gateway with bounded timeouts and read retries.
#[derive(Debug, Clone)]
pub struct RetryingGateway<G> {
    inner: G,
    config: RetryConfig,
}

impl<G: MarketGateway> RetryingGateway<G> {
    #[must_use]
    pub fn new(inner: G, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the wrapped gateway.
    #[must_use]
    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn read<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.config.request_timeout(), call()).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout(format!(
                    "{operation} exceeded {}s",
                    self.config.request_timeout_secs
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    let delay = err
                        .retry_after_secs()
                        .map_or_else(|| self.config.backoff(attempt), Duration::from_secs);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient gateway failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn write_once<T, Fut>(&self, operation: String, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.config.request_timeout(), call).await {
            Ok(Err(GatewayError::Timeout(reason) | GatewayError::Network(reason))) => {
                Err(GatewayError::ambiguous(operation, reason))
            }
            Ok(result) => result,
            Err(_) => Err(GatewayError::ambiguous(
                operation,
                format!("no response within {}s", self.config.request_timeout_secs),
            )),
        }
    }
}

#[async_trait]
impl<G: MarketGateway> MarketGateway for RetryingGateway<G> {
    async fn get_spot_price(&self, underlying: &str) -> Result<SpotQuote> {
        self.read("get_spot_price", || self.inner.get_spot_price(underlying))
            .await
    }

    async fn get_option_chain(
        &self,
        underlying: &str,
        expiry_class: ExpiryClass,
    ) -> Result<OptionChain> {
        self.read("get_option_chain", || {
            self.inner.get_option_chain(underlying, expiry_class)
        })
        .await
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal> {
        self.read("get_mark_price", || self.inner.get_mark_price(symbol))
            .await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderHandle> {
        self.write_once(
            format!("place_order {}", order.symbol),
            self.inner.place_order(order),
        )
        .await
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderHandle> {
        self.read("get_order_status", || self.inner.get_order_status(order_id))
            .await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.write_once(
            format!("cancel_order {order_id}"),
            self.inner.cancel_order(order_id),
        )
        .await
    }

    async fn get_wallet_balance(&self, asset: &str) -> Result<WalletBalance> {
        self.read("get_wallet_balance", || self.inner.get_wallet_balance(asset))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderState, Side};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Gateway that fails the first `failures` calls with `error`.
    struct FlakyGateway {
        calls: AtomicU32,
        failures: u32,
        error: GatewayError,
        hang: bool,
    }

    impl FlakyGateway {
        fn new(failures: u32, error: GatewayError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                error,
                hang: false,
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::new(0, GatewayError::Timeout(String::new()))
            }
        }

        async fn step(&self) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if n < self.failures {
                return Err(self.error.clone());
            }
            Ok(())
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketGateway for FlakyGateway {
        async fn get_spot_price(&self, underlying: &str) -> Result<SpotQuote> {
            self.step().await?;
            Ok(SpotQuote {
                underlying: underlying.to_string(),
                price: dec!(60000),
                timestamp: Utc::now(),
            })
        }

        async fn get_option_chain(&self, underlying: &str, _: ExpiryClass) -> Result<OptionChain> {
            self.step().await?;
            Ok(OptionChain {
                underlying: underlying.to_string(),
                expiry: String::new(),
                contracts: Vec::new(),
            })
        }

        async fn get_mark_price(&self, _symbol: &str) -> Result<Decimal> {
            self.step().await?;
            Ok(dec!(100))
        }

        async fn place_order(&self, order: &OrderRequest) -> Result<OrderHandle> {
            self.step().await?;
            Ok(OrderHandle {
                order_id: "1".to_string(),
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
                state: OrderState::Filled,
                avg_fill_price: Some(dec!(100)),
            })
        }

        async fn get_order_status(&self, order_id: &str) -> Result<OrderHandle> {
            self.step().await?;
            Ok(OrderHandle {
                order_id: order_id.to_string(),
                symbol: "C-BTC-60000-111025".to_string(),
                side: Side::Buy,
                quantity: 1,
                state: OrderState::Pending,
                avg_fill_price: None,
            })
        }

        async fn cancel_order(&self, _order_id: &str) -> Result<()> {
            self.step().await
        }

        async fn get_wallet_balance(&self, asset: &str) -> Result<WalletBalance> {
            self.step().await?;
            Ok(WalletBalance {
                asset: asset.to_string(),
                balance: dec!(1000),
                available: dec!(1000),
            })
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            request_timeout_secs: 5,
        }
    }

    fn order() -> OrderRequest {
        OrderRequest {
            symbol: "C-BTC-60000-111025".to_string(),
            product_id: 1,
            side: Side::Buy,
            quantity: 1,
            kind: crate::types::OrderKind::Market,
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn read_retries_transient_failures() {
        let flaky = Arc::new(FlakyGateway::new(2, GatewayError::api(502, "bad gateway")));
        let gateway = RetryingGateway::new(flaky.clone(), fast_config());

        let quote = gateway.get_spot_price("BTC").await.unwrap();
        assert_eq!(quote.price, dec!(60000));
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn read_gives_up_after_max_retries() {
        let flaky = Arc::new(FlakyGateway::new(10, GatewayError::Network("reset".into())));
        let gateway = RetryingGateway::new(flaky.clone(), fast_config());

        let err = gateway.get_mark_price("C-BTC-60000-111025").await.unwrap_err();
        assert!(matches!(err, GatewayError::Network(_)));
        // initial attempt + 3 retries
        assert_eq!(flaky.calls(), 4);
    }

    #[tokio::test]
    async fn read_does_not_retry_permanent_failures() {
        let flaky = Arc::new(FlakyGateway::new(1, GatewayError::NotFound("X".into())));
        let gateway = RetryingGateway::new(flaky.clone(), fast_config());

        assert!(gateway.get_wallet_balance("USD").await.is_err());
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn place_order_is_never_retried() {
        let flaky = Arc::new(FlakyGateway::new(1, GatewayError::api(503, "unavailable")));
        let gateway = RetryingGateway::new(flaky.clone(), fast_config());

        let err = gateway.place_order(&order()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Api { status_code: 503, .. }));
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn place_order_transport_failure_is_ambiguous() {
        let flaky = Arc::new(FlakyGateway::new(1, GatewayError::Timeout("read".into())));
        let gateway = RetryingGateway::new(flaky.clone(), fast_config());

        let err = gateway.place_order(&order()).await.unwrap_err();
        assert!(err.is_ambiguous());
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn place_order_timeout_is_ambiguous() {
        let flaky = Arc::new(FlakyGateway::hanging());
        let config = RetryConfig {
            request_timeout_secs: 1,
            ..fast_config()
        };
        let gateway = RetryingGateway::new(flaky.clone(), config);

        let err = gateway.place_order(&order()).await.unwrap_err();
        assert!(err.is_ambiguous());
        assert!(err.to_string().contains("C-BTC-60000-111025"));
    }

    #[tokio::test]
    async fn chain_read_succeeds_first_time() {
        let flaky = Arc::new(FlakyGateway::new(0, GatewayError::Network(String::new())));
        let gateway = RetryingGateway::new(flaky.clone(), fast_config());

        let chain = gateway.get_option_chain("BTC", ExpiryClass::Daily).await.unwrap();
        assert!(chain.contracts.is_empty());
        assert_eq!(flaky.calls(), 1);
    }
}
