//! Strategy parameters and position records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use straddle_core::{Contract, ExpiryClass, Side};

use crate::executor::Protection;
use crate::risk::RiskLevels;

/// Position direction. Long buys both legs, short sells both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Side of the entry orders.
    #[must_use]
    pub const fn entry_side(self) -> Side {
        match self {
            Self::Long => Side::Buy,
            Self::Short => Side::Sell,
        }
    }

    /// Side of the exit and protective orders.
    #[must_use]
    pub const fn exit_side(self) -> Side {
        self.entry_side().opposite()
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Self::Long),
            "short" | "sell" => Ok(Self::Short),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Whether percentage strikes are placed out of or in the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Moneyness {
    Otm,
    Itm,
}

impl std::str::FromStr for Moneyness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "otm" => Ok(Self::Otm),
            "itm" => Ok(Self::Itm),
            other => Err(format!("unknown moneyness: {other}")),
        }
    }
}

/// How target strikes are derived from spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StrikeMethod {
    /// Strikes `value` percent away from spot.
    Percentage { moneyness: Moneyness, value: Decimal },
    /// Strikes `steps` increments away from the ATM strike.
    AtmOffset { steps: u32 },
}

/// Unit convention for a stop or target price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceUnit {
    /// Percent of entry cost.
    Percentage,
    /// Premium points relative to entry cost.
    Absolute,
    /// Multiple of entry cost.
    Multiple,
}

impl std::str::FromStr for PriceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "percentage" | "pct" | "percent" => Ok(Self::Percentage),
            "absolute" | "points" => Ok(Self::Absolute),
            "multiple" | "x" => Ok(Self::Multiple),
            other => Err(format!("unknown price unit: {other}")),
        }
    }
}

/// A price expressed in one of the [`PriceUnit`] conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRule {
    pub unit: PriceUnit,
    pub value: Decimal,
}

impl PriceRule {
    #[must_use]
    pub const fn new(unit: PriceUnit, value: Decimal) -> Self {
        Self { unit, value }
    }
}

/// Everything needed to preview or open a straddle/strangle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub underlying: String,
    pub expiry: ExpiryClass,
    pub method: StrikeMethod,
    pub lot_size: u32,
    pub direction: Direction,
    /// Protective stop trigger.
    pub stop_trigger: PriceRule,
    /// Protective stop limit.
    pub stop_limit: PriceRule,
    pub target: Option<PriceRule>,
    /// Monitor stop-loss threshold on P&L percent.
    pub stop_loss_pct: Decimal,
    /// Monitor target threshold on P&L percent.
    pub target_pct: Option<Decimal>,
}

/// Exit signal raised by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    StopLoss,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    /// Exit condition hit, close pending.
    Triggered,
    Closed,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Triggered => write!(f, "triggered"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Reason a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    Target,
    Manual,
}

impl From<TriggerKind> for CloseReason {
    fn from(kind: TriggerKind) -> Self {
        match kind {
            TriggerKind::StopLoss => Self::StopLoss,
            TriggerKind::Target => Self::Target,
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::Target => write!(f, "target"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// One filled leg of a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub contract: Contract,
    pub entry_order_id: String,
    pub entry_price: Decimal,
    pub exit_order_id: Option<String>,
    pub exit_price: Option<Decimal>,
    /// Stop levels pinned to this leg by move-to-cost. `None` follows the
    /// position's levels scaled by premium share.
    #[serde(default)]
    pub stop: Option<RiskLevels>,
}

impl Leg {
    #[must_use]
    pub fn new(contract: Contract, entry_order_id: String, entry_price: Decimal) -> Self {
        Self {
            contract,
            entry_order_id,
            entry_price,
            exit_order_id: None,
            exit_price: None,
            stop: None,
        }
    }
}

/// A live or closed two-leg position.
///
/// Both legs always carry the same lot size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPosition {
    pub id: String,
    pub underlying: String,
    pub expiry: String,
    pub direction: Direction,
    pub lot_size: u32,
    pub call: Leg,
    pub put: Leg,
    /// Combined entry premium per lot.
    pub entry_cost: Decimal,
    pub risk: RiskLevels,
    pub stop_loss_pct: Decimal,
    pub target_pct: Option<Decimal>,
    pub protection: Protection,
    pub status: PositionStatus,
    pub close_reason: Option<CloseReason>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Combined exit premium per lot.
    pub exit_cost: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
}

impl StrategyPosition {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// Stop levels the protective order of `leg` uses.
    #[must_use]
    pub fn leg_stop(&self, leg: &Leg) -> RiskLevels {
        leg.stop
            .unwrap_or_else(|| self.risk.for_leg(leg.entry_price, self.entry_cost))
    }

    /// True for a straddle, false for a strangle.
    #[must_use]
    pub fn is_straddle(&self) -> bool {
        self.call.contract.strike == self.put.contract.strike
    }
}

/// Result of a completed close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub id: String,
    pub reason: CloseReason,
    pub exit_cost: Decimal,
    pub realized_pnl: Decimal,
    pub position: StrategyPosition,
}
