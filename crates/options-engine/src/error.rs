//! Error types for strategy preview, execution and monitoring.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use straddle_core::{GatewayError, OrderHandle};
use thiserror::Error;

/// Outcome of the single compensating order sent after a failed second leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// Compensating order filled; no residual exposure.
    Completed { order: OrderHandle },
    /// Compensating order was refused or never filled. The first leg is still live.
    Failed { reason: String },
    /// Compensating order outcome unknown.
    Ambiguous { reason: String },
}

impl RollbackOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

impl std::fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed { order } => write!(f, "completed ({})", order.order_id),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Ambiguous { reason } => write!(f, "ambiguous: {reason}"),
        }
    }
}

/// Failures of a two-leg entry or exit.
///
/// Every variant carries enough venue state to reconcile by hand.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// First leg did not fill. Nothing executed unless `ambiguous` is set,
    /// which covers unknown outcomes and partial fills.
    #[error("call leg {symbol} failed: {reason}")]
    CallLegFailed {
        symbol: String,
        reason: String,
        /// The order may still be live on the venue.
        ambiguous: bool,
    },

    /// Second leg did not fill after the first one did.
    #[error(
        "put leg {symbol} failed after call leg {} filled: {reason} (rollback attempted: {rollback_attempted})",
        .call_order.order_id
    )]
    PutLegFailed {
        call_order: OrderHandle,
        symbol: String,
        reason: String,
        ambiguous: bool,
        rollback_attempted: bool,
        rollback_result: Option<RollbackOutcome>,
    },
}

impl ExecutionError {
    /// Returns true if venue state is unknown and needs manual reconciliation.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        match self {
            Self::CallLegFailed { ambiguous, .. } => *ambiguous,
            Self::PutLegFailed {
                ambiguous,
                rollback_result,
                ..
            } => *ambiguous || matches!(rollback_result, Some(RollbackOutcome::Ambiguous { .. })),
        }
    }

    /// Returns true if both legs ended as they were before the attempt:
    /// the first leg never executed, or its compensating order completed.
    #[must_use]
    pub fn legs_unchanged(&self) -> bool {
        match self {
            Self::CallLegFailed { ambiguous, .. } => !*ambiguous,
            Self::PutLegFailed {
                ambiguous,
                rollback_result,
                ..
            } => !*ambiguous && matches!(rollback_result, Some(RollbackOutcome::Completed { .. })),
        }
    }
}

/// Errors returned by the strategy engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Out-of-range or malformed input. Raised before any network call.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no matching contract: {0}")]
    NoMatchingContract(String),

    /// Price, chain or balance fetch failed after gateway retries.
    #[error("market data unavailable: {0}")]
    MarketDataUnavailable(String),

    /// Move-to-cost requested before the position is in profit.
    #[error("not profitable yet: entry {entry_cost}, current {current}")]
    NotProfitableYet { entry_cost: Decimal, current: Decimal },

    #[error("insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Decimal, available: Decimal },

    /// Another execution holds the position lock.
    #[error("position {0} has an execution in flight")]
    PositionBusy(String),

    #[error("position {0} is already closed")]
    PositionClosed(String),

    #[error("position {0} not found")]
    PositionNotFound(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl EngineError {
    /// Wraps a failed gateway read.
    #[must_use]
    pub fn market_data(err: GatewayError) -> Self {
        Self::MarketDataUnavailable(err.to_string())
    }

    /// Returns true if the caller may simply retry later.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoMatchingContract(_)
                | Self::MarketDataUnavailable(_)
                | Self::NotProfitableYet { .. }
                | Self::PositionBusy(_)
        )
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
