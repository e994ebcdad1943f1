//! Strike selection.
//!
//! Converts a spot price and a [`StrikeMethod`] into target call/put strikes.
//! Pure functions: no I/O, no clock.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::{Moneyness, StrikeMethod};

/// Largest accepted percentage distance from spot.
pub const MAX_PERCENTAGE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

/// Largest accepted ATM offset, in strike increments.
pub const MAX_ATM_OFFSET: u32 = 10;

/// Target strikes for both legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeTarget {
    pub call: Decimal,
    pub put: Decimal,
    /// Spot rounded to the nearest listed increment.
    pub atm: Decimal,
    pub method: StrikeMethod,
}

impl StrikeTarget {
    /// True when both legs target the same strike.
    #[must_use]
    pub fn is_straddle(&self) -> bool {
        self.call == self.put
    }
}

impl StrikeMethod {
    /// Builds a method from loosely typed input such as CLI arguments.
    ///
    /// # Errors
    /// `InvalidParameter` for an unknown method name or a fractional/negative offset.
    pub fn parse(name: &str, moneyness: Option<Moneyness>, value: Decimal) -> Result<Self> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "percentage" => Ok(Self::Percentage {
                moneyness: moneyness.unwrap_or(Moneyness::Otm),
                value,
            }),
            "atm_offset" => {
                if !value.fract().is_zero() {
                    return Err(EngineError::InvalidParameter(format!(
                        "ATM offset must be a whole number of increments, got {value}"
                    )));
                }
                let steps = value.to_u32().ok_or_else(|| {
                    EngineError::InvalidParameter(format!("ATM offset out of range: {value}"))
                })?;
                Ok(Self::AtmOffset { steps })
            }
            other => Err(EngineError::InvalidParameter(format!(
                "unrecognized strike method: {other}"
            ))),
        }
    }
}

/// Rounds `price` to the nearest multiple of `increment`, halves away from zero.
///
/// # Errors
/// `InvalidParameter` if `increment` is not positive.
pub fn round_to_increment(price: Decimal, increment: Decimal) -> Result<Decimal> {
    if increment <= Decimal::ZERO {
        return Err(EngineError::InvalidParameter(format!(
            "strike increment must be positive, got {increment}"
        )));
    }
    let steps = (price / increment).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    Ok(steps * increment)
}

/// Computes target strikes for both legs.
///
/// - `Percentage`: otm puts the call `value`% above spot and the put `value`%
///   below; itm swaps them. `value` must be in (0, 50].
/// - `AtmOffset`: `atm ± steps * increment` with `steps` in 0..=10. Zero
///   yields a straddle.
///
/// # Errors
/// `InvalidParameter` for non-positive spot/increment or an out-of-range value.
pub fn select_strikes(
    spot_price: Decimal,
    method: &StrikeMethod,
    strike_increment: Decimal,
) -> Result<StrikeTarget> {
    if spot_price <= Decimal::ZERO {
        return Err(EngineError::InvalidParameter(format!(
            "spot price must be positive, got {spot_price}"
        )));
    }
    let atm = round_to_increment(spot_price, strike_increment)?;

    let (call, put) = match *method {
        StrikeMethod::Percentage { moneyness, value } => {
            if value <= Decimal::ZERO || value > MAX_PERCENTAGE {
                return Err(EngineError::InvalidParameter(format!(
                    "strike percentage must be in (0, {MAX_PERCENTAGE}], got {value}"
                )));
            }
            let factor = value / Decimal::ONE_HUNDRED;
            let above = spot_price * (Decimal::ONE + factor);
            let below = spot_price * (Decimal::ONE - factor);
            match moneyness {
                Moneyness::Otm => (above, below),
                Moneyness::Itm => (below, above),
            }
        }
        StrikeMethod::AtmOffset { steps } => {
            if steps > MAX_ATM_OFFSET {
                return Err(EngineError::InvalidParameter(format!(
                    "ATM offset must be in 0..={MAX_ATM_OFFSET}, got {steps}"
                )));
            }
            let distance = strike_increment * Decimal::from(steps);
            let put = atm - distance;
            if put <= Decimal::ZERO {
                return Err(EngineError::InvalidParameter(format!(
                    "ATM offset {steps} puts the put strike at {put}"
                )));
            }
            (atm + distance, put)
        }
    };

    tracing::debug!(
        spot = %spot_price,
        atm = %atm,
        call = %call,
        put = %put,
        "Selected target strikes"
    );

    Ok(StrikeTarget {
        call,
        put,
        atm,
        method: *method,
    })
}
