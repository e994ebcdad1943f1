//! Straddle and strangle engine.
//!
//! Pipeline, leaf first:
//! - [`strikes`]: spot + method to target call/put strikes
//! - [`matcher`]: targets to the nearest listed contracts
//! - [`risk`]: entry cost, stop/target prices, breakeven, straddle comparison
//! - [`margin`]: pre-trade balance check
//! - [`executor`]: two-leg entry/exit with one compensating rollback, protective stops
//! - [`monitor`]: P&L and stop-loss/target evaluation, move-to-cost
//! - [`service`]: [`StrategyEngine`] tying the above to a [`straddle_core::MarketGateway`]

pub mod error;
pub mod executor;
pub mod margin;
pub mod matcher;
pub mod monitor;
pub mod risk;
pub mod service;
pub mod strikes;
pub mod types;
pub mod validation;

pub use error::{EngineError, ExecutionError, Result, RollbackOutcome};
pub use executor::{EntryState, LegFills, MultiLegExecutor, Protection};
pub use margin::{check_margin, MarginCheck, DEFAULT_MARGIN_BUFFER};
pub use matcher::{match_contracts, MatchedContracts};
pub use monitor::{evaluate, move_to_cost, pnl_pct, unrealized_pnl, CostStops, PnlSnapshot};
pub use risk::{
    compare_with_straddle, compute_breakeven, compute_risk, compute_target, Breakeven,
    CostComparison, ProfitZone, RiskLevels,
};
pub use service::{EngineConfig, PreviewResult, StrategyEngine};
pub use strikes::{round_to_increment, select_strikes, StrikeTarget};
pub use types::{
    ClosedPosition, CloseReason, Direction, Leg, Moneyness, PositionStatus, PriceRule, PriceUnit,
    StrategyParams, StrategyPosition, StrikeMethod, TriggerKind,
};
pub use validation::validate_params;
