//! Pre-trade margin check.
//!
//! The venue reports available balance; the engine requires a buffer on top
//! of the position cost before sending any order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default buffer over position cost.
pub const DEFAULT_MARGIN_BUFFER: Decimal = Decimal::from_parts(12, 0, 0, false, 1);

/// Result of a margin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarginCheck {
    Sufficient {
        required: Decimal,
        available: Decimal,
        headroom: Decimal,
    },
    Insufficient {
        required: Decimal,
        available: Decimal,
        shortfall: Decimal,
    },
}

impl MarginCheck {
    #[must_use]
    pub fn is_sufficient(&self) -> bool {
        matches!(self, Self::Sufficient { .. })
    }

    #[must_use]
    pub fn required(&self) -> Decimal {
        match self {
            Self::Sufficient { required, .. } | Self::Insufficient { required, .. } => *required,
        }
    }

    #[must_use]
    pub fn available(&self) -> Decimal {
        match self {
            Self::Sufficient { available, .. } | Self::Insufficient { available, .. } => *available,
        }
    }
}

/// Checks `available >= total_cost * buffer`.
#[must_use]
pub fn check_margin(available: Decimal, total_cost: Decimal, buffer: Decimal) -> MarginCheck {
    let required = total_cost * buffer;
    if available >= required {
        MarginCheck::Sufficient {
            required,
            available,
            headroom: available - required,
        }
    } else {
        MarginCheck::Insufficient {
            required,
            available,
            shortfall: required - available,
        }
    }
}
