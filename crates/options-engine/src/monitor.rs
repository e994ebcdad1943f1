//! Position evaluation: P&L, stop-loss/target detection and move-to-cost.
//!
//! Pure functions over a position record and a pair of live marks. The
//! recurring poll that supplies the marks lives in [`crate::service`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::risk::{entry_cost, RiskLevels};
use crate::types::{Direction, Leg, StrategyPosition, TriggerKind};

/// Default distance of the move-to-cost limit beyond entry, in percent.
pub const DEFAULT_MOVE_TO_COST_OFFSET_PCT: Decimal = Decimal::from_parts(2, 0, 0, false, 0);

/// Unrealized P&L of a position at given marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnlSnapshot {
    /// Combined current premium per lot.
    pub current_cost: Decimal,
    pub pnl_pct: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Per-lot premium change in the holder's favour.
fn premium_gain(direction: Direction, entry: Decimal, current: Decimal) -> Decimal {
    match direction {
        Direction::Long => current - entry,
        Direction::Short => entry - current,
    }
}

/// P&L in percent of entry cost. Positive is profit for the holder.
#[must_use]
pub fn pnl_pct(position: &StrategyPosition, call_mark: Decimal, put_mark: Decimal) -> Decimal {
    if position.entry_cost.is_zero() {
        return Decimal::ZERO;
    }
    let current = entry_cost(call_mark, put_mark);
    premium_gain(position.direction, position.entry_cost, current) / position.entry_cost
        * Decimal::ONE_HUNDRED
}

/// Unrealized P&L across all lots.
#[must_use]
pub fn unrealized_pnl(position: &StrategyPosition, call_mark: Decimal, put_mark: Decimal) -> Decimal {
    let current = entry_cost(call_mark, put_mark);
    premium_gain(position.direction, position.entry_cost, current) * Decimal::from(position.lot_size)
}

#[must_use]
pub fn snapshot(position: &StrategyPosition, call_mark: Decimal, put_mark: Decimal) -> PnlSnapshot {
    PnlSnapshot {
        current_cost: entry_cost(call_mark, put_mark),
        pnl_pct: pnl_pct(position, call_mark, put_mark)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        unrealized_pnl: unrealized_pnl(position, call_mark, put_mark),
    }
}

/// Checks exit conditions. Stop-loss wins over target; both bounds are inclusive.
#[must_use]
pub fn evaluate(
    position: &StrategyPosition,
    call_mark: Decimal,
    put_mark: Decimal,
) -> Option<TriggerKind> {
    let pnl = pnl_pct(position, call_mark, put_mark);

    if pnl <= -position.stop_loss_pct {
        tracing::warn!(
            position_id = %position.id,
            pnl_pct = %pnl.round_dp(2),
            threshold = %position.stop_loss_pct,
            "Stop loss triggered"
        );
        return Some(TriggerKind::StopLoss);
    }

    if let Some(target_pct) = position.target_pct {
        if pnl >= target_pct {
            tracing::info!(
                position_id = %position.id,
                pnl_pct = %pnl.round_dp(2),
                threshold = %target_pct,
                "Target hit"
            );
            return Some(TriggerKind::Target);
        }
    }

    None
}

/// New stop levels for the legs that move to cost. `None` keeps a leg's
/// current stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostStops {
    pub call: Option<RiskLevels>,
    pub put: Option<RiskLevels>,
}

impl CostStops {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.call.is_none() && self.put.is_none()
    }
}

fn leg_to_cost(
    position: &StrategyPosition,
    leg: &Leg,
    mark: Decimal,
    offset: Decimal,
) -> Option<RiskLevels> {
    let entry = leg.entry_price;
    if premium_gain(position.direction, entry, mark) <= Decimal::ZERO {
        return None;
    }
    let limit = match position.direction {
        Direction::Long => entry * (Decimal::ONE - offset),
        Direction::Short => entry * (Decimal::ONE + offset),
    };
    Some(RiskLevels {
        trigger: entry,
        limit,
        target: position.leg_stop(leg).target,
    })
}

/// Moves the protective stop of every leg already in profit to its entry
/// price.
///
/// The limit sits `limit_offset_pct` percent beyond entry against the holder.
/// A leg whose mark has not moved in the holder's favour keeps its stop, so
/// no stop ends up on the wrong side of its own mark.
///
/// # Errors
/// `NotProfitableYet` when neither leg is in profit.
pub fn move_to_cost(
    position: &StrategyPosition,
    call_mark: Decimal,
    put_mark: Decimal,
    limit_offset_pct: Decimal,
) -> Result<CostStops> {
    let offset = limit_offset_pct / Decimal::ONE_HUNDRED;
    let stops = CostStops {
        call: leg_to_cost(position, &position.call, call_mark, offset),
        put: leg_to_cost(position, &position.put, put_mark, offset),
    };

    if stops.is_empty() {
        let current = entry_cost(call_mark, put_mark);
        tracing::debug!(
            position_id = %position.id,
            entry = %position.entry_cost,
            current = %current,
            "Move to cost refused, no leg in profit"
        );
        return Err(EngineError::NotProfitableYet {
            entry_cost: position.entry_cost,
            current,
        });
    }

    Ok(stops)
}
