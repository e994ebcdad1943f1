//! Shared market and order types.
//!
//! These are the records exchanged between the engine and any
//! `MarketGateway` implementation. They carry venue snapshots only; the
//! engine never owns a listed contract, it references it by symbol/id.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option kind (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the side that offsets this one.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Expiry bucket requested by the caller.
///
/// Resolution of a bucket to a concrete listed expiry is a gateway concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryClass {
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for ExpiryClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for ExpiryClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown expiry class: {other}")),
        }
    }
}

/// Spot price of an underlying at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotQuote {
    pub underlying: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A listed option contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Venue symbol, e.g. `C-BTC-60000-111025`.
    pub symbol: String,
    pub underlying: String,
    pub kind: OptionKind,
    pub strike: Decimal,
    /// Expiry identifier as used in the venue symbol (`DDMMYY`).
    pub expiry: String,
    pub expiry_date: Option<NaiveDate>,
    /// Venue product identifier.
    pub product_id: i64,
}

impl Contract {
    /// Human-readable description (e.g. "BTC 60000C 111025").
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}{} {}", self.underlying, self.strike, self.kind, self.expiry)
    }
}

/// Option chain for a single resolved expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying: String,
    /// Expiry tag the requested class resolved to. Empty when nothing matched.
    pub expiry: String,
    pub contracts: Vec<Contract>,
}

/// Order kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum OrderKind {
    Market,
    Limit { price: Decimal },
    /// Stop order: activates at `trigger`, fills no worse than `limit`.
    StopLimit { trigger: Decimal, limit: Decimal },
}

impl OrderKind {
    #[must_use]
    pub const fn is_stop(&self) -> bool {
        matches!(self, Self::StopLimit { .. })
    }
}

/// A single-leg order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub product_id: i64,
    pub side: Side,
    /// Lot size. Always positive.
    pub quantity: u32,
    pub kind: OrderKind,
    pub reduce_only: bool,
}

impl OrderRequest {
    /// Market order opening or adding to a position.
    #[must_use]
    pub fn market(contract: &Contract, side: Side, quantity: u32) -> Self {
        Self {
            symbol: contract.symbol.clone(),
            product_id: contract.product_id,
            side,
            quantity,
            kind: OrderKind::Market,
            reduce_only: false,
        }
    }

    /// Stop-limit order that can only reduce an existing position.
    #[must_use]
    pub fn stop_limit(
        contract: &Contract,
        side: Side,
        quantity: u32,
        trigger: Decimal,
        limit: Decimal,
    ) -> Self {
        Self {
            symbol: contract.symbol.clone(),
            product_id: contract.product_id,
            side,
            quantity,
            kind: OrderKind::StopLimit { trigger, limit },
            reduce_only: true,
        }
    }

    /// Marks the order as reduce-only.
    #[must_use]
    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// Order lifecycle state as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Filled,
    /// Done on the venue with only `filled` lots executed.
    PartiallyFilled { filled: u32 },
    Cancelled,
    Rejected,
}

impl OrderState {
    /// Returns true if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Filled => write!(f, "filled"),
            Self::PartiallyFilled { filled } => write!(f, "partially filled ({filled})"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Venue acknowledgement of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: u32,
    pub state: OrderState,
    pub avg_fill_price: Option<Decimal>,
}

impl OrderHandle {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.state == OrderState::Filled
    }

    /// Lots actually executed.
    #[must_use]
    pub fn filled_quantity(&self) -> u32 {
        match self.state {
            OrderState::Filled => self.quantity,
            OrderState::PartiallyFilled { filled } => filled.min(self.quantity),
            OrderState::Pending | OrderState::Cancelled | OrderState::Rejected => 0,
        }
    }
}

/// Wallet balance for one settlement asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub asset: String,
    pub balance: Decimal,
    /// Balance not blocked as margin or by open orders.
    pub available: Decimal,
}
