//! Local validation of strategy parameters. Runs before any network call.

use rust_decimal::Decimal;

use crate::error::{EngineError, Result};
use crate::strikes::{MAX_ATM_OFFSET, MAX_PERCENTAGE};
use crate::types::{StrategyParams, StrikeMethod};

pub const MIN_LOT_SIZE: u32 = 1;
pub const MAX_LOT_SIZE: u32 = 100;

fn invalid(message: String) -> EngineError {
    EngineError::InvalidParameter(message)
}

/// Checks ranges and shapes of every field.
///
/// # Errors
/// `InvalidParameter` naming the first offending field.
pub fn validate_params(params: &StrategyParams) -> Result<()> {
    if params.underlying.is_empty()
        || !params.underlying.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(invalid(format!(
            "underlying must be non-empty alphanumeric, got {:?}",
            params.underlying
        )));
    }

    if !(MIN_LOT_SIZE..=MAX_LOT_SIZE).contains(&params.lot_size) {
        return Err(invalid(format!(
            "lot size must be in {MIN_LOT_SIZE}..={MAX_LOT_SIZE}, got {}",
            params.lot_size
        )));
    }

    match params.method {
        StrikeMethod::Percentage { value, .. } => {
            if value <= Decimal::ZERO || value > MAX_PERCENTAGE {
                return Err(invalid(format!(
                    "strike percentage must be in (0, {MAX_PERCENTAGE}], got {value}"
                )));
            }
        }
        StrikeMethod::AtmOffset { steps } => {
            if steps > MAX_ATM_OFFSET {
                return Err(invalid(format!(
                    "ATM offset must be in 0..={MAX_ATM_OFFSET}, got {steps}"
                )));
            }
        }
    }

    if params.stop_trigger.value <= Decimal::ZERO || params.stop_limit.value <= Decimal::ZERO {
        return Err(invalid("stop trigger and limit values must be positive".to_string()));
    }
    // every unit grows with its value, so same-unit rules compare directly
    if params.stop_trigger.unit == params.stop_limit.unit
        && params.stop_limit.value <= params.stop_trigger.value
    {
        return Err(invalid(format!(
            "stop limit {} must be above stop trigger {}",
            params.stop_limit.value, params.stop_trigger.value
        )));
    }
    if matches!(params.target, Some(rule) if rule.value <= Decimal::ZERO) {
        return Err(invalid("target value must be positive".to_string()));
    }
    if params.stop_loss_pct <= Decimal::ZERO {
        return Err(invalid(format!(
            "stop-loss percentage must be positive, got {}",
            params.stop_loss_pct
        )));
    }
    if matches!(params.target_pct, Some(pct) if pct <= Decimal::ZERO) {
        return Err(invalid("target percentage must be positive".to_string()));
    }

    Ok(())
}
