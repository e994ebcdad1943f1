//! Paper trading gateway.
//!
//! `PaperGateway` implements [`MarketGateway`] against an in-memory book so
//! the engine can be exercised without touching the venue. Market data is
//! either scripted (`set_spot`, `add_contract`, `set_mark`) or read from a
//! live gateway supplied with [`PaperGateway::with_market_data`]. Orders are
//! always simulated.
//!
//! # Example
//!
//! ```
//! use straddle_delta::{PaperGateway, PaperGatewayConfig};
//! use straddle_core::MarketGateway;
//! use rust_decimal_macros::dec;
//!
//! #[tokio::main]
//! async fn main() {
//!     let paper = PaperGateway::new(PaperGatewayConfig::with_balance(dec!(5000)));
//!     paper.set_spot("BTC", dec!(60400));
//!     let quote = paper.get_spot_price("BTC").await.unwrap();
//!     assert_eq!(quote.price, dec!(60400));
//! }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use straddle_core::error::Result;
use straddle_core::{
    Contract, ExpiryClass, GatewayError, MarketGateway, OptionChain, OrderHandle, OrderKind,
    OrderRequest, OrderState, Side, SpotQuote, WalletBalance,
};
use uuid::Uuid;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the paper gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperGatewayConfig {
    /// Starting balance of the settlement asset.
    pub initial_balance: Decimal,

    /// Settlement asset reported by `get_wallet_balance`.
    pub settlement_asset: String,

    /// Whether market orders fill immediately at the mark price.
    /// When false they rest as pending until filled by hand.
    pub fill_market_orders: bool,

    /// Simulated latency in milliseconds for order calls.
    pub simulate_latency_ms: u64,
}

impl Default for PaperGatewayConfig {
    fn default() -> Self {
        Self {
            initial_balance: Decimal::from(10_000),
            settlement_asset: "USD".to_string(),
            fill_market_orders: true,
            simulate_latency_ms: 0,
        }
    }
}

impl PaperGatewayConfig {
    /// Creates a config with the specified starting balance.
    #[must_use]
    pub fn with_balance(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            ..Default::default()
        }
    }

    /// Creates a config that fills every market order.
    #[must_use]
    pub fn always_fill() -> Self {
        Self::default()
    }

    /// Creates a config where market orders never fill on their own.
    #[must_use]
    pub fn never_fill() -> Self {
        Self {
            fill_market_orders: false,
            ..Default::default()
        }
    }

    /// Sets the settlement asset.
    #[must_use]
    pub fn settlement_asset(mut self, asset: impl Into<String>) -> Self {
        self.settlement_asset = asset.into();
        self
    }

    /// Sets the simulated latency.
    #[must_use]
    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.simulate_latency_ms = ms;
        self
    }
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug)]
struct PaperState {
    balance: Decimal,
    spots: HashMap<String, Decimal>,
    contracts: Vec<Contract>,
    marks: HashMap<String, Decimal>,
    /// Expiry tag each class resolves to. Unmapped classes use the nearest listed expiry.
    expiries: HashMap<ExpiryClass, String>,
    orders: HashMap<String, OrderHandle>,
    /// Every submission in arrival order, including refused ones.
    history: Vec<OrderRequest>,
    rejected_symbols: HashSet<String>,
    ambiguous_symbols: HashSet<String>,
    reject_stops: bool,
    cancellations: u32,
}

impl PaperState {
    fn new(initial_balance: Decimal) -> Self {
        Self {
            balance: initial_balance,
            spots: HashMap::new(),
            contracts: Vec::new(),
            marks: HashMap::new(),
            expiries: HashMap::new(),
            orders: HashMap::new(),
            history: Vec::new(),
            rejected_symbols: HashSet::new(),
            ambiguous_symbols: HashSet::new(),
            reject_stops: false,
            cancellations: 0,
        }
    }
}

// =============================================================================
// Paper Gateway
// =============================================================================

/// Simulated venue for paper trading and tests.
///
/// Cloning shares the underlying book.
#[derive(Clone)]
pub struct PaperGateway {
    config: PaperGatewayConfig,
    state: Arc<RwLock<PaperState>>,
    market_data: Option<Arc<dyn MarketGateway>>,
}

impl std::fmt::Debug for PaperGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperGateway")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("live_market_data", &self.market_data.is_some())
            .finish()
    }
}

impl PaperGateway {
    /// Creates a paper gateway with scripted market data.
    #[must_use]
    pub fn new(config: PaperGatewayConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(PaperState::new(config.initial_balance))),
            config,
            market_data: None,
        }
    }

    /// Reads spot, chains and marks from `source` instead of the script.
    #[must_use]
    pub fn with_market_data(mut self, source: Arc<dyn MarketGateway>) -> Self {
        self.market_data = Some(source);
        self
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> &PaperGatewayConfig {
        &self.config
    }

    // ---- scripting -----------------------------------------------------------

    pub fn set_spot(&self, underlying: &str, price: Decimal) {
        self.state
            .write()
            .spots
            .insert(underlying.to_ascii_uppercase(), price);
    }

    /// Lists a contract. Replaces an existing listing with the same symbol.
    pub fn add_contract(&self, contract: Contract) {
        let mut state = self.state.write();
        state.contracts.retain(|c| c.symbol != contract.symbol);
        state.contracts.push(contract);
    }

    pub fn set_mark(&self, symbol: &str, price: Decimal) {
        self.state.write().marks.insert(symbol.to_string(), price);
    }

    /// Pins the expiry tag an expiry class resolves to.
    pub fn map_expiry(&self, class: ExpiryClass, tag: impl Into<String>) {
        self.state.write().expiries.insert(class, tag.into());
    }

    /// Rejects every subsequent order for `symbol`.
    pub fn reject_symbol(&self, symbol: &str) {
        self.state.write().rejected_symbols.insert(symbol.to_string());
    }

    /// Answers every subsequent order for `symbol` with an unknown outcome.
    pub fn ambiguous_symbol(&self, symbol: &str) {
        self.state
            .write()
            .ambiguous_symbols
            .insert(symbol.to_string());
    }

    /// Rejects every subsequent stop order.
    pub fn reject_stop_orders(&self, reject: bool) {
        self.state.write().reject_stops = reject;
    }

    /// Fills a resting order at `price`.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown orders and `InvalidRequest` if the order is no longer pending.
    pub fn fill_order(&self, order_id: &str, price: Decimal) -> Result<OrderHandle> {
        let mut state = self.state.write();
        let handle = state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("order {order_id}")))?;
        if handle.state != OrderState::Pending {
            return Err(GatewayError::InvalidRequest(format!(
                "order {order_id} is {}",
                handle.state
            )));
        }

        let filled = OrderHandle {
            state: OrderState::Filled,
            avg_fill_price: Some(price),
            ..handle
        };
        settle(&mut state.balance, &filled, price);
        state.orders.insert(order_id.to_string(), filled.clone());
        Ok(filled)
    }

    /// Finishes a resting order with only `filled` lots executed at `price`.
    ///
    /// # Errors
    /// Same as [`Self::fill_order`], plus `InvalidRequest` unless
    /// `0 < filled < quantity`.
    pub fn partially_fill_order(
        &self,
        order_id: &str,
        filled: u32,
        price: Decimal,
    ) -> Result<OrderHandle> {
        let mut state = self.state.write();
        let handle = state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("order {order_id}")))?;
        if handle.state != OrderState::Pending {
            return Err(GatewayError::InvalidRequest(format!(
                "order {order_id} is {}",
                handle.state
            )));
        }
        if filled == 0 || filled >= handle.quantity {
            return Err(GatewayError::InvalidRequest(format!(
                "partial fill of {filled} for order of {}",
                handle.quantity
            )));
        }

        let partial = OrderHandle {
            state: OrderState::PartiallyFilled { filled },
            avg_fill_price: Some(price),
            ..handle
        };
        settle(&mut state.balance, &partial, price);
        state.orders.insert(order_id.to_string(), partial.clone());
        Ok(partial)
    }

    // ---- inspection ----------------------------------------------------------

    /// Current settlement balance.
    #[must_use]
    pub fn balance(&self) -> Decimal {
        self.state.read().balance
    }

    /// Every order submission in arrival order.
    #[must_use]
    pub fn order_history(&self) -> Vec<OrderRequest> {
        self.state.read().history.clone()
    }

    /// Number of orders submitted, including refused ones.
    #[must_use]
    pub fn orders_submitted(&self) -> usize {
        self.state.read().history.len()
    }

    /// Number of successful cancellations.
    #[must_use]
    pub fn cancellations(&self) -> u32 {
        self.state.read().cancellations
    }

    /// Orders still resting on the book.
    #[must_use]
    pub fn open_orders(&self) -> Vec<OrderHandle> {
        self.state
            .read()
            .orders
            .values()
            .filter(|o| o.state == OrderState::Pending)
            .cloned()
            .collect()
    }

    /// Resets the book, keeping scripted market data.
    pub fn reset_orders(&self) {
        let mut state = self.state.write();
        state.orders.clear();
        state.history.clear();
        state.cancellations = 0;
        state.balance = self.config.initial_balance;
    }

    async fn simulate_latency(&self) {
        if self.config.simulate_latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.simulate_latency_ms)).await;
        }
    }

    fn scripted_chain(&self, underlying: &str, class: ExpiryClass) -> OptionChain {
        let state = self.state.read();
        let listed: Vec<&Contract> = state
            .contracts
            .iter()
            .filter(|c| c.underlying.eq_ignore_ascii_case(underlying))
            .collect();

        let expiry = state.expiries.get(&class).cloned().or_else(|| {
            listed
                .iter()
                .min_by(|a, b| (a.expiry_date, &a.expiry).cmp(&(b.expiry_date, &b.expiry)))
                .map(|c| c.expiry.clone())
        });

        match expiry {
            Some(expiry) => OptionChain {
                underlying: underlying.to_string(),
                contracts: listed
                    .into_iter()
                    .filter(|c| c.expiry == expiry)
                    .cloned()
                    .collect(),
                expiry,
            },
            None => OptionChain {
                underlying: underlying.to_string(),
                expiry: String::new(),
                contracts: Vec::new(),
            },
        }
    }
}

/// Moves cash for a fill: buying pays premium, selling receives it.
fn settle(balance: &mut Decimal, handle: &OrderHandle, price: Decimal) {
    let notional = price * Decimal::from(handle.filled_quantity());
    match handle.side {
        Side::Buy => *balance -= notional,
        Side::Sell => *balance += notional,
    }
}

#[async_trait]
impl MarketGateway for PaperGateway {
    async fn get_spot_price(&self, underlying: &str) -> Result<SpotQuote> {
        if let Some(source) = &self.market_data {
            return source.get_spot_price(underlying).await;
        }

        let key = underlying.to_ascii_uppercase();
        let price = self
            .state
            .read()
            .spots
            .get(&key)
            .copied()
            .ok_or_else(|| GatewayError::Unavailable(format!("no spot price for {key}")))?;

        Ok(SpotQuote {
            underlying: key,
            price,
            timestamp: Utc::now(),
        })
    }

    async fn get_option_chain(
        &self,
        underlying: &str,
        expiry_class: ExpiryClass,
    ) -> Result<OptionChain> {
        if let Some(source) = &self.market_data {
            return source.get_option_chain(underlying, expiry_class).await;
        }
        Ok(self.scripted_chain(underlying, expiry_class))
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal> {
        if let Some(mark) = self.state.read().marks.get(symbol).copied() {
            return Ok(mark);
        }
        match &self.market_data {
            Some(source) => source.get_mark_price(symbol).await,
            None => Err(GatewayError::Unavailable(format!("no mark price for {symbol}"))),
        }
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderHandle> {
        self.simulate_latency().await;

        // resolve the fill price before taking the write lock
        let fill_price = if order.kind == OrderKind::Market && self.config.fill_market_orders {
            Some(self.get_mark_price(&order.symbol).await)
        } else {
            None
        };

        let mut state = self.state.write();
        state.history.push(order.clone());

        if order.quantity == 0 {
            return Err(GatewayError::InvalidRequest(
                "order size must be positive".to_string(),
            ));
        }
        if state.ambiguous_symbols.contains(&order.symbol) {
            tracing::warn!(symbol = %order.symbol, "Paper order outcome withheld");
            return Err(GatewayError::ambiguous(
                format!("place_order {}", order.symbol),
                "simulated lost response",
            ));
        }
        if state.rejected_symbols.contains(&order.symbol) {
            return Err(GatewayError::rejected(format!(
                "simulated rejection for {}",
                order.symbol
            )));
        }
        if state.reject_stops && order.kind.is_stop() {
            return Err(GatewayError::rejected("simulated stop order rejection"));
        }

        let mut handle = OrderHandle {
            order_id: format!("paper-{}", Uuid::new_v4()),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            state: OrderState::Pending,
            avg_fill_price: None,
        };

        if let Some(price) = fill_price {
            let price = price.map_err(|e| GatewayError::rejected(e.to_string()))?;
            handle.state = OrderState::Filled;
            handle.avg_fill_price = Some(price);
            settle(&mut state.balance, &handle, price);
        }

        tracing::debug!(
            order_id = %handle.order_id,
            symbol = %handle.symbol,
            side = %handle.side,
            quantity = handle.quantity,
            state = %handle.state,
            "Paper order accepted"
        );

        state.orders.insert(handle.order_id.clone(), handle.clone());
        Ok(handle)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderHandle> {
        self.state
            .read()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("order {order_id}")))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.simulate_latency().await;

        let mut state = self.state.write();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| GatewayError::NotFound(format!("order {order_id}")))?;
        if order.state != OrderState::Pending {
            return Err(GatewayError::InvalidRequest(format!(
                "order {order_id} is already {}",
                order.state
            )));
        }
        order.state = OrderState::Cancelled;
        state.cancellations += 1;
        Ok(())
    }

    async fn get_wallet_balance(&self, asset: &str) -> Result<WalletBalance> {
        if !asset.eq_ignore_ascii_case(&self.config.settlement_asset) {
            return Err(GatewayError::NotFound(format!("wallet asset {asset}")));
        }
        let balance = self.state.read().balance;
        Ok(WalletBalance {
            asset: self.config.settlement_asset.clone(),
            balance,
            available: balance,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
