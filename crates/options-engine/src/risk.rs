//! Risk calculation: stop/target prices, breakeven bounds and cost comparison.
//!
//! All three unit conventions treat a rise in combined premium over entry
//! as the loss direction, for long and short structures alike. Stop prices
//! therefore always sit above entry cost for positive inputs.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::{Direction, PriceRule, PriceUnit};

/// Decimal places kept on per-leg order prices.
const LEG_PRICE_DP: u32 = 2;

// =============================================================================
// Risk Levels
// =============================================================================

/// Stop and target prices on combined premium (or on one leg, see [`RiskLevels::for_leg`]).
///
/// Never mutated once orders are placed; a new value replaces the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLevels {
    pub trigger: Decimal,
    pub limit: Decimal,
    pub target: Option<Decimal>,
}

impl RiskLevels {
    /// Scales combined levels to one leg by that leg's share of entry cost.
    #[must_use]
    pub fn for_leg(&self, leg_premium: Decimal, entry_cost: Decimal) -> Self {
        if entry_cost.is_zero() {
            return *self;
        }
        let share = leg_premium / entry_cost;
        let scale = |price: Decimal| {
            (price * share)
                .round_dp_with_strategy(LEG_PRICE_DP, RoundingStrategy::MidpointAwayFromZero)
        };
        Self {
            trigger: scale(self.trigger),
            limit: scale(self.limit),
            target: self.target.map(scale),
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: Option<Decimal>) -> Self {
        self.target = target;
        self
    }
}

fn require_positive(name: &str, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(EngineError::InvalidParameter(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(())
}

fn price_from_rule(entry_cost: Decimal, rule: PriceRule) -> Decimal {
    match rule.unit {
        PriceUnit::Percentage => entry_cost * (Decimal::ONE + rule.value / Decimal::ONE_HUNDRED),
        PriceUnit::Absolute => entry_cost + rule.value,
        PriceUnit::Multiple => entry_cost * rule.value,
    }
}

/// Computes the protective stop trigger and limit from entry cost.
///
/// Trigger and limit are converted independently. Their relative order is
/// the caller's concern; move-to-cost deliberately uses a trigger equal to entry.
///
/// # Errors
/// `InvalidParameter` on non-positive entry cost or rule values.
pub fn compute_risk(entry_cost: Decimal, trigger: PriceRule, limit: PriceRule) -> Result<RiskLevels> {
    require_positive("entry cost", entry_cost)?;
    require_positive("stop trigger value", trigger.value)?;
    require_positive("stop limit value", limit.value)?;

    Ok(RiskLevels {
        trigger: price_from_rule(entry_cost, trigger),
        limit: price_from_rule(entry_cost, limit),
        target: None,
    })
}

/// Computes the take-profit price for a direction.
///
/// # Errors
/// `InvalidParameter` on non-positive inputs or a non-positive resulting price.
pub fn compute_target(entry_cost: Decimal, rule: PriceRule, direction: Direction) -> Result<Decimal> {
    require_positive("entry cost", entry_cost)?;
    require_positive("target value", rule.value)?;

    let price = match (rule.unit, direction) {
        (PriceUnit::Percentage, Direction::Long) => {
            entry_cost * (Decimal::ONE + rule.value / Decimal::ONE_HUNDRED)
        }
        (PriceUnit::Percentage, Direction::Short) => {
            entry_cost * (Decimal::ONE - rule.value / Decimal::ONE_HUNDRED)
        }
        (PriceUnit::Absolute, Direction::Long) => entry_cost + rule.value,
        (PriceUnit::Absolute, Direction::Short) => entry_cost - rule.value,
        (PriceUnit::Multiple, _) => entry_cost * rule.value,
    };

    if price <= Decimal::ZERO {
        return Err(EngineError::InvalidParameter(format!(
            "target resolves to non-positive price {price}"
        )));
    }
    Ok(price)
}

// =============================================================================
// Breakeven
// =============================================================================

/// Where on the underlying the holder makes money at expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfitZone {
    /// Above `upper` or below `lower`.
    Outside,
    /// Between `lower` and `upper`.
    Inside,
}

/// Underlying prices at which the structure breaks even at expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakeven {
    pub upper: Decimal,
    pub lower: Decimal,
    pub direction: Direction,
}

impl Breakeven {
    #[must_use]
    pub fn profit_zone(&self) -> ProfitZone {
        match self.direction {
            Direction::Long => ProfitZone::Outside,
            Direction::Short => ProfitZone::Inside,
        }
    }

    /// Returns true if an expiry at `underlying_price` is profitable.
    #[must_use]
    pub fn is_profitable_at(&self, underlying_price: Decimal) -> bool {
        match self.profit_zone() {
            ProfitZone::Outside => underlying_price > self.upper || underlying_price < self.lower,
            ProfitZone::Inside => underlying_price > self.lower && underlying_price < self.upper,
        }
    }
}

/// Breakeven bounds: `higher_strike + premium` and `lower_strike - premium`.
#[must_use]
pub fn compute_breakeven(
    call_strike: Decimal,
    put_strike: Decimal,
    total_premium: Decimal,
    direction: Direction,
) -> Breakeven {
    Breakeven {
        upper: call_strike.max(put_strike) + total_premium,
        lower: call_strike.min(put_strike) - total_premium,
        direction,
    }
}

// =============================================================================
// Costs
// =============================================================================

/// Combined premium of both legs, per lot.
#[must_use]
pub fn entry_cost(call_premium: Decimal, put_premium: Decimal) -> Decimal {
    call_premium + put_premium
}

/// Total premium across all lots.
#[must_use]
pub fn position_cost(total_premium: Decimal, lot_size: u32) -> Decimal {
    total_premium * Decimal::from(lot_size)
}

/// Premium saved by trading a strangle instead of the ATM straddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostComparison {
    pub straddle_premium: Decimal,
    pub strangle_premium: Decimal,
    pub savings: Decimal,
    pub savings_pct: Decimal,
}

/// Compares strangle premium against the straddle on the same chain.
///
/// # Errors
/// `InvalidParameter` if `straddle_premium` is not positive.
pub fn compare_with_straddle(
    straddle_premium: Decimal,
    strangle_premium: Decimal,
) -> Result<CostComparison> {
    require_positive("straddle premium", straddle_premium)?;
    let savings = straddle_premium - strangle_premium;
    Ok(CostComparison {
        straddle_premium,
        strangle_premium,
        savings,
        savings_pct: (savings / straddle_premium * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
    })
}
