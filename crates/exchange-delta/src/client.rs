//! Delta Exchange REST API client with rate limiting.
//!
//! Provides typed access to the Delta endpoints the engine needs and
//! implements [`MarketGateway`] on top of them. Each call is a single
//! attempt; retry policy belongs to [`straddle_core::RetryingGateway`].
//!
//! # Example
//!
//! ```ignore
//! use straddle_delta::{DeltaClient, DeltaClientConfig};
//! use straddle_core::{ExpiryClass, MarketGateway};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DeltaClient::new(DeltaClientConfig::default())?;
//!
//!     let spot = client.get_spot_price("BTC").await?;
//!     let chain = client.get_option_chain("BTC", ExpiryClass::Weekly).await?;
//!     println!("{} contracts for {} around {}", chain.contracts.len(), chain.expiry, spot.price);
//!
//!     Ok(())
//! }
//! ```

use crate::auth::{DeltaAuth, DeltaAuthConfig};
use crate::error::{DeltaError, Result};
use crate::expiry::{expiry_tag, resolve_expiry};
use crate::types::{
    RawEnvelope, RawOrder, RawOrderRequest, RawProduct, RawTicker, RawWalletBalance,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use straddle_core::{
    Contract, DeltaConfig, ExpiryClass, GatewayError, MarketGateway, OptionChain, OrderHandle,
    OrderRequest, SpotQuote, WalletBalance,
};
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

/// Delta Exchange India production API base URL.
pub const DELTA_INDIA_URL: &str = "https://api.india.delta.exchange";

/// Delta Exchange India testnet API base URL.
pub const DELTA_INDIA_TESTNET_URL: &str = "https://cdn-ind.testnet.deltaex.org";

const OPTIONS_QUERY: &str = "?contract_types=call_options,put_options&states=live";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Delta client.
#[derive(Debug, Clone)]
pub struct DeltaClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Authentication configuration.
    pub auth_config: DeltaAuthConfig,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for DeltaClientConfig {
    fn default() -> Self {
        Self {
            base_url: DELTA_INDIA_URL.to_string(),
            auth_config: DeltaAuthConfig::default(),
            requests_per_minute: nonzero!(120u32),
            timeout_secs: 30,
            user_agent: "straddle-engine/0.1".to_string(),
        }
    }
}

impl From<&DeltaConfig> for DeltaClientConfig {
    fn from(config: &DeltaConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            auth_config: DeltaAuthConfig::default()
                .with_env_vars(config.api_key_env.clone(), config.api_secret_env.clone()),
            requests_per_minute: NonZeroU32::new(config.requests_per_minute)
                .unwrap_or(nonzero!(120u32)),
            timeout_secs: config.timeout_secs,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl DeltaClientConfig {
    /// Creates a configuration for the testnet.
    #[must_use]
    pub fn testnet() -> Self {
        Self {
            base_url: DELTA_INDIA_TESTNET_URL.to_string(),
            ..Default::default()
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// =============================================================================
// DeltaClient
// =============================================================================

/// Delta Exchange REST API client.
///
/// Market data endpoints are public. Wallet and order endpoints require
/// credentials; a client built with [`DeltaClient::public`] rejects them
/// with a configuration error.
pub struct DeltaClient {
    /// Configuration.
    config: DeltaClientConfig,

    /// HTTP client.
    http: Client,

    /// Rate limiter.
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,

    /// Request signer, absent for public-only clients.
    auth: Option<DeltaAuth>,
}

impl std::fmt::Debug for DeltaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .field("authenticated", &self.auth.is_some())
            .finish_non_exhaustive()
    }
}

impl DeltaClient {
    /// Creates an authenticated client, reading credentials from the
    /// environment variables named in the configuration.
    ///
    /// # Errors
    /// Returns error if credentials are missing or the HTTP client cannot be built.
    pub fn new(config: DeltaClientConfig) -> Result<Self> {
        let auth = DeltaAuth::from_env(&config.auth_config)?;
        Self::build(config, Some(auth))
    }

    /// Creates an authenticated client with explicit credentials.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_auth(config: DeltaClientConfig, auth: DeltaAuth) -> Result<Self> {
        Self::build(config, Some(auth))
    }

    /// Creates a client limited to public market data.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn public(config: DeltaClientConfig) -> Result<Self> {
        Self::build(config, None)
    }

    fn build(config: DeltaClientConfig, auth: Option<DeltaAuth>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DeltaError::Network(format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(config.requests_per_minute);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            config,
            http,
            rate_limiter,
            auth,
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Validates a symbol before it is placed into a request path.
    ///
    /// Valid symbols contain only alphanumerics, hyphens, underscores and dots.
    fn validate_symbol(symbol: &str) -> Result<&str> {
        if symbol.is_empty() {
            return Err(DeltaError::InvalidRequest("symbol cannot be empty".to_string()));
        }

        if symbol.contains("..") || symbol.contains('/') || symbol.contains('\\') {
            return Err(DeltaError::InvalidRequest(format!(
                "invalid symbol: contains forbidden characters: {symbol}"
            )));
        }

        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(DeltaError::InvalidRequest(format!(
                "invalid symbol: must contain only alphanumeric, hyphen, underscore or dot: {symbol}"
            )));
        }

        if symbol.len() > 64 {
            return Err(DeltaError::InvalidRequest(format!(
                "invalid symbol: exceeds maximum length of 64: {}",
                symbol.len()
            )));
        }

        Ok(symbol)
    }

    /// Validates an order id. Delta order ids are numeric.
    fn validate_order_id(id: &str) -> Result<&str> {
        if id.is_empty() || id.len() > 32 || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(DeltaError::InvalidRequest(format!(
                "invalid order id: {id}"
            )));
        }
        Ok(id)
    }

    /// Waits for the rate limiter and performs one request.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<String>,
        signed: bool,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}{}", self.config.base_url, path, query);
        let body_str = body.unwrap_or_default();

        tracing::debug!(method = %method, url = %url, body_len = body_str.len(), "Delta request");

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header("Accept", "application/json");

        if signed {
            let auth = self.auth.as_ref().ok_or_else(|| {
                DeltaError::Authentication(format!("{path} requires API credentials"))
            })?;
            let headers = auth.sign_request(method.as_str(), path, query, &body_str)?;
            for (name, value) in headers.as_tuples() {
                builder = builder.header(name, value);
            }
        }

        if !body_str.is_empty() {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body_str);
        }

        let response = builder.send().await?;
        self.handle_response(response).await
    }

    /// Handles API response, converting errors appropriately.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(DeltaError::rate_limit(retry_after));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DeltaError::api(status.as_u16(), text));
        }

        let envelope = response.json::<RawEnvelope<T>>().await?;
        if !envelope.success {
            return Err(DeltaError::api(status.as_u16(), envelope.error_message()));
        }

        envelope
            .result
            .ok_or_else(|| DeltaError::MissingData("response without result".to_string()))
    }

    // =========================================================================
    // Market Data Endpoints
    // =========================================================================

    /// Lists live option contracts across all underlyings and expiries.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_option_products(&self) -> Result<Vec<Contract>> {
        let products: Vec<RawProduct> = self
            .request(Method::GET, "/v2/products", OPTIONS_QUERY, None, false)
            .await?;

        Ok(products
            .into_iter()
            .filter_map(RawProduct::into_contract)
            .collect())
    }

    /// Gets the ticker for a symbol.
    async fn get_ticker(&self, symbol: &str) -> Result<RawTicker> {
        let symbol = Self::validate_symbol(symbol)?;
        self.request(
            Method::GET,
            &format!("/v2/tickers/{symbol}"),
            "",
            None,
            false,
        )
        .await
    }

    /// Builds the chain for `underlying` at the expiry `class` resolves to.
    ///
    /// # Errors
    /// Returns error if the product listing cannot be fetched.
    pub async fn option_chain_on(
        &self,
        underlying: &str,
        class: ExpiryClass,
        today: NaiveDate,
    ) -> Result<OptionChain> {
        let contracts: Vec<Contract> = self
            .get_option_products()
            .await?
            .into_iter()
            .filter(|c| c.underlying.eq_ignore_ascii_case(underlying))
            .collect();

        let resolved = resolve_expiry(contracts.iter().filter_map(|c| c.expiry_date), class, today);

        let Some(expiry_date) = resolved else {
            tracing::warn!(underlying, class = %class, "No listed expiry for class");
            return Ok(OptionChain {
                underlying: underlying.to_string(),
                expiry: String::new(),
                contracts: Vec::new(),
            });
        };

        let contracts: Vec<Contract> = contracts
            .into_iter()
            .filter(|c| c.expiry_date == Some(expiry_date))
            .collect();

        tracing::debug!(
            underlying,
            class = %class,
            expiry = %expiry_date,
            contracts = contracts.len(),
            "Resolved option chain"
        );

        Ok(OptionChain {
            underlying: underlying.to_string(),
            expiry: expiry_tag(expiry_date),
            contracts,
        })
    }

    // =========================================================================
    // Account Endpoints
    // =========================================================================

    /// Gets balances for all settlement assets.
    ///
    /// # Errors
    /// Returns error if the API call fails or the client is unauthenticated.
    pub async fn get_wallet_balances(&self) -> Result<Vec<WalletBalance>> {
        let rows: Vec<RawWalletBalance> = self
            .request(Method::GET, "/v2/wallet/balances", "", None, true)
            .await?;
        Ok(rows.into_iter().map(WalletBalance::from).collect())
    }

    // =========================================================================
    // Order Endpoints
    // =========================================================================

    /// Submits an order.
    ///
    /// Every submission carries a fresh `client_order_id` so an ambiguous
    /// outcome can be reconciled against the venue by hand.
    ///
    /// # Errors
    /// Returns `OrderRejected` on 4xx responses and propagates other failures.
    pub async fn submit_order(&self, order: &OrderRequest) -> Result<OrderHandle> {
        Self::validate_symbol(&order.symbol)?;
        if order.quantity == 0 {
            return Err(DeltaError::InvalidRequest("order size must be positive".to_string()));
        }

        let client_order_id = Uuid::new_v4().simple().to_string();
        let body = serde_json::to_string(&RawOrderRequest::new(order, client_order_id.clone()))?;

        let raw: RawOrder = match self
            .request(Method::POST, "/v2/orders", "", Some(body), true)
            .await
        {
            Ok(raw) => raw,
            Err(DeltaError::Api {
                status_code,
                message,
            }) if (400..500).contains(&status_code) => {
                tracing::warn!(
                    symbol = %order.symbol,
                    side = %order.side,
                    status_code,
                    reason = %message,
                    "Order rejected"
                );
                return Err(DeltaError::OrderRejected(message));
            }
            Err(e) => return Err(e),
        };

        let handle = raw.into_handle(Some(order));
        tracing::info!(
            order_id = %handle.order_id,
            client_order_id = %client_order_id,
            symbol = %handle.symbol,
            side = %handle.side,
            quantity = handle.quantity,
            state = %handle.state,
            "Order submitted"
        );
        Ok(handle)
    }

    /// Gets an order by id.
    ///
    /// # Errors
    /// Returns error if the order is unknown or the API call fails.
    pub async fn get_order(&self, order_id: &str) -> Result<OrderHandle> {
        let order_id = Self::validate_order_id(order_id)?;
        let raw: RawOrder = self
            .request(Method::GET, &format!("/v2/orders/{order_id}"), "", None, true)
            .await
            .map_err(|e| match e {
                DeltaError::Api {
                    status_code: 404, ..
                } => DeltaError::NotFound(format!("order {order_id}")),
                other => other,
            })?;
        Ok(raw.into_handle(None))
    }

    /// Cancels an order by id.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn delete_order(&self, order_id: &str) -> Result<()> {
        let order_id = Self::validate_order_id(order_id)?;
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                &format!("/v2/orders/{order_id}"),
                "",
                None,
                true,
            )
            .await?;
        tracing::info!(order_id, "Order cancelled");
        Ok(())
    }
}

// =============================================================================
// MarketGateway
// =============================================================================

#[async_trait]
impl MarketGateway for DeltaClient {
    async fn get_spot_price(&self, underlying: &str) -> straddle_core::error::Result<SpotQuote> {
        // spot is read from the USD perpetual
        let symbol = format!("{}USD", underlying.to_ascii_uppercase());
        let ticker = self.get_ticker(&symbol).await?;
        let price = ticker
            .mark_price
            .or(ticker.spot_price)
            .filter(|p| p.is_sign_positive() && !p.is_zero())
            .ok_or_else(|| DeltaError::MissingData(format!("mark_price for {symbol}")))?;

        Ok(SpotQuote {
            underlying: underlying.to_ascii_uppercase(),
            price,
            timestamp: Utc::now(),
        })
    }

    async fn get_option_chain(
        &self,
        underlying: &str,
        expiry_class: ExpiryClass,
    ) -> straddle_core::error::Result<OptionChain> {
        Ok(self
            .option_chain_on(underlying, expiry_class, Utc::now().date_naive())
            .await?)
    }

    async fn get_mark_price(&self, symbol: &str) -> straddle_core::error::Result<Decimal> {
        let ticker = self.get_ticker(symbol).await?;
        Ok(ticker
            .mark_price
            .ok_or_else(|| DeltaError::MissingData(format!("mark_price for {symbol}")))?)
    }

    async fn place_order(&self, order: &OrderRequest) -> straddle_core::error::Result<OrderHandle> {
        Ok(self.submit_order(order).await?)
    }

    async fn get_order_status(&self, order_id: &str) -> straddle_core::error::Result<OrderHandle> {
        Ok(self.get_order(order_id).await?)
    }

    async fn cancel_order(&self, order_id: &str) -> straddle_core::error::Result<()> {
        Ok(self.delete_order(order_id).await?)
    }

    async fn get_wallet_balance(&self, asset: &str) -> straddle_core::error::Result<WalletBalance> {
        self.get_wallet_balances()
            .await?
            .into_iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
            .ok_or_else(|| GatewayError::NotFound(format!("wallet asset {asset}")))
    }
}

// =============================================================================
// Tests
// =============================================================================
