//! Strategy engine: preview, open, close and per-position monitoring.
//!
//! Positions live in an in-memory book. Each entry carries its own mutex,
//! so executions serialize per position while different positions proceed
//! concurrently, plus a `watch` flag that monitor tasks use to stop once the
//! position is closed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use straddle_core::{
    AppConfig, ExecutionConfig, MarketGateway, MonitorConfig, OptionChain, OrderHandle,
    StrikeConfig,
};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, ExecutionError, Result};
use crate::executor::{MultiLegExecutor, Protection};
use crate::margin::{check_margin, MarginCheck};
use crate::matcher::{match_contracts, MatchedContracts};
use crate::monitor::{self, CostStops};
use crate::risk::{
    compare_with_straddle, compute_breakeven, compute_risk, compute_target, entry_cost,
    position_cost, Breakeven, CostComparison, RiskLevels,
};
use crate::strikes::{select_strikes, StrikeTarget};
use crate::types::{
    ClosedPosition, CloseReason, Direction, Leg, PositionStatus, StrategyParams,
    StrategyPosition, TriggerKind,
};
use crate::validation::validate_params;

/// Shortest monitor period; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Configuration
// =============================================================================

/// Engine settings drawn from [`AppConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub execution: ExecutionConfig,
    pub monitor: MonitorConfig,
    pub strikes: StrikeConfig,
    /// Wallet asset checked for margin.
    pub settlement_asset: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            execution: config.execution.clone(),
            monitor: config.monitor.clone(),
            strikes: config.strikes.clone(),
            settlement_asset: config.delta.settlement_asset.clone(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.monitor.poll_interval_secs = secs;
        self
    }

    #[must_use]
    pub fn with_fill_timeout_secs(mut self, secs: u64) -> Self {
        self.execution.fill_timeout_secs = secs;
        self
    }
}

// =============================================================================
// Preview
// =============================================================================

/// Everything needed to decide on a trade, computed without side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewResult {
    pub underlying: String,
    /// Listed expiry tag the requested class resolved to.
    pub expiry: String,
    pub direction: Direction,
    pub lot_size: u32,
    pub spot: Decimal,
    pub strikes: StrikeTarget,
    pub contracts: MatchedContracts,
    pub call_premium: Decimal,
    pub put_premium: Decimal,
    /// Combined premium per lot.
    pub entry_cost: Decimal,
    /// Combined premium across all lots.
    pub total_cost: Decimal,
    pub risk: RiskLevels,
    pub breakeven: Breakeven,
    pub margin: MarginCheck,
    /// Strangle savings against the ATM straddle. `None` for straddles.
    pub straddle_comparison: Option<CostComparison>,
}

impl PreviewResult {
    #[must_use]
    pub fn is_straddle(&self) -> bool {
        self.contracts.call.strike == self.contracts.put.strike
    }
}

/// Stop and target levels for an entry cost.
///
/// The stop limit must lie strictly beyond the trigger on the loss side, which
/// is a higher premium for both directions.
fn risk_for(params: &StrategyParams, entry: Decimal) -> Result<RiskLevels> {
    let target = params
        .target
        .map(|rule| compute_target(entry, rule, params.direction))
        .transpose()?;
    let levels = compute_risk(entry, params.stop_trigger, params.stop_limit)?;
    if levels.limit <= levels.trigger {
        return Err(EngineError::InvalidParameter(format!(
            "stop limit {} must be above stop trigger {} for entry cost {entry}",
            levels.limit.round_dp(2),
            levels.trigger.round_dp(2)
        )));
    }
    Ok(levels.with_target(target))
}

// =============================================================================
// Position Book
// =============================================================================

struct PositionEntry {
    position: Mutex<StrategyPosition>,
    closed: watch::Sender<bool>,
}

#[derive(Default)]
struct PositionBook {
    entries: RwLock<HashMap<String, Arc<PositionEntry>>>,
}

impl PositionBook {
    async fn insert(&self, position: StrategyPosition) {
        let (closed, _) = watch::channel(position.is_closed());
        let id = position.id.clone();
        let entry = Arc::new(PositionEntry {
            position: Mutex::new(position),
            closed,
        });
        self.entries.write().await.insert(id, entry);
    }

    async fn get(&self, id: &str) -> Result<Arc<PositionEntry>> {
        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::PositionNotFound(id.to_string()))
    }

    async fn all(&self) -> Vec<Arc<PositionEntry>> {
        self.entries.read().await.values().cloned().collect()
    }
}

// =============================================================================
// Strategy Engine
// =============================================================================

/// Front door for the UI and persistence layers.
pub struct StrategyEngine<G> {
    executor: MultiLegExecutor<G>,
    config: EngineConfig,
    book: PositionBook,
    shutdown: watch::Sender<bool>,
}

impl<G: MarketGateway> StrategyEngine<G> {
    #[must_use]
    pub fn new(gateway: G, config: EngineConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            executor: MultiLegExecutor::new(gateway, config.execution.clone()),
            config,
            book: PositionBook::default(),
            shutdown,
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        self.executor.gateway()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Computes strikes, contracts, premiums, risk levels and margin.
    ///
    /// Read-only; repeated calls against the same market return the same result.
    ///
    /// # Errors
    /// `InvalidParameter` before any network call, then `MarketDataUnavailable`
    /// or `NoMatchingContract` from the market lookups.
    pub async fn compute_preview(&self, params: &StrategyParams) -> Result<PreviewResult> {
        validate_params(params)?;
        let gateway = self.gateway();

        let spot = gateway
            .get_spot_price(&params.underlying)
            .await
            .map_err(EngineError::market_data)?;
        let increment = self.config.strikes.increment_for(&params.underlying);
        let strikes = select_strikes(spot.price, &params.method, increment)?;

        let chain = gateway
            .get_option_chain(&params.underlying, params.expiry)
            .await
            .map_err(EngineError::market_data)?;
        let contracts = match_contracts(
            strikes.call,
            strikes.put,
            &chain.contracts,
            &chain.expiry,
            spot.price,
        )?;

        let (call_premium, put_premium) = self.marks(&contracts).await?;
        let premium = entry_cost(call_premium, put_premium);
        let risk = risk_for(params, premium)?;
        let breakeven = compute_breakeven(
            contracts.call.strike,
            contracts.put.strike,
            premium,
            params.direction,
        );
        let total_cost = position_cost(premium, params.lot_size);

        let wallet = gateway
            .get_wallet_balance(&self.config.settlement_asset)
            .await
            .map_err(EngineError::market_data)?;
        let margin = check_margin(wallet.available, total_cost, self.config.execution.margin_buffer);

        let straddle_comparison = if contracts.call.strike == contracts.put.strike {
            None
        } else {
            self.straddle_comparison(&chain, strikes.atm, spot.price, premium)
                .await
        };

        debug!(
            underlying = %params.underlying,
            expiry = %chain.expiry,
            call = %contracts.call.symbol,
            put = %contracts.put.symbol,
            entry_cost = %premium,
            sufficient_margin = margin.is_sufficient(),
            "Preview computed"
        );

        Ok(PreviewResult {
            underlying: params.underlying.clone(),
            expiry: chain.expiry,
            direction: params.direction,
            lot_size: params.lot_size,
            spot: spot.price,
            strikes,
            contracts,
            call_premium,
            put_premium,
            entry_cost: premium,
            total_cost,
            risk,
            breakeven,
            margin,
            straddle_comparison,
        })
    }

    async fn marks(&self, contracts: &MatchedContracts) -> Result<(Decimal, Decimal)> {
        let call = self
            .gateway()
            .get_mark_price(&contracts.call.symbol)
            .await
            .map_err(EngineError::market_data)?;
        let put = self
            .gateway()
            .get_mark_price(&contracts.put.symbol)
            .await
            .map_err(EngineError::market_data)?;
        Ok((call, put))
    }

    /// Prices the ATM straddle on the same chain. Informational only.
    async fn straddle_comparison(
        &self,
        chain: &OptionChain,
        atm: Decimal,
        spot: Decimal,
        strangle_premium: Decimal,
    ) -> Option<CostComparison> {
        let outcome = async {
            let atm_contracts = match_contracts(atm, atm, &chain.contracts, &chain.expiry, spot)?;
            let (call, put) = self.marks(&atm_contracts).await?;
            compare_with_straddle(entry_cost(call, put), strangle_premium)
        }
        .await;

        match outcome {
            Ok(comparison) => Some(comparison),
            Err(err) => {
                debug!(error = %err, "Straddle comparison unavailable");
                None
            }
        }
    }

    /// Opens a position: preview, margin check, entry, protection.
    ///
    /// The position is registered and returned even when protection fails;
    /// check [`StrategyPosition::protection`].
    ///
    /// # Errors
    /// Preview errors, `InsufficientMargin` before any order, or `Execution`.
    pub async fn open_position(&self, params: &StrategyParams) -> Result<StrategyPosition> {
        let preview = self.compute_preview(params).await?;

        if let MarginCheck::Insufficient {
            required,
            available,
            ..
        } = preview.margin
        {
            warn!(
                underlying = %params.underlying,
                required = %required,
                available = %available,
                "Insufficient margin, position not opened"
            );
            return Err(EngineError::InsufficientMargin {
                required,
                available,
            });
        }

        let fills = self
            .executor
            .execute_entry(
                &preview.contracts.call,
                &preview.contracts.put,
                params.lot_size,
                params.direction,
            )
            .await?;

        let call_price = fills.call_order.avg_fill_price.unwrap_or(preview.call_premium);
        let put_price = fills.put_order.avg_fill_price.unwrap_or(preview.put_premium);
        let premium = entry_cost(call_price, put_price);
        let risk = risk_for(params, premium).unwrap_or_else(|err| {
            warn!(error = %err, "Risk levels from fills invalid, keeping preview levels");
            preview.risk
        });

        let mut position = StrategyPosition {
            id: uuid::Uuid::new_v4().to_string(),
            underlying: params.underlying.clone(),
            expiry: preview.expiry.clone(),
            direction: params.direction,
            lot_size: params.lot_size,
            call: Leg::new(preview.contracts.call.clone(), fills.call_order.order_id, call_price),
            put: Leg::new(preview.contracts.put.clone(), fills.put_order.order_id, put_price),
            entry_cost: premium,
            risk,
            stop_loss_pct: params.stop_loss_pct,
            target_pct: params.target_pct,
            protection: Protection::unplaced("not yet placed"),
            status: PositionStatus::Open,
            close_reason: None,
            opened_at: Utc::now(),
            closed_at: None,
            exit_cost: None,
            realized_pnl: None,
        };
        position.protection = self.executor.place_protection(&position).await;

        info!(
            position_id = %position.id,
            call = %position.call.contract.symbol,
            put = %position.put.contract.symbol,
            entry_cost = %position.entry_cost,
            direction = %position.direction,
            protected = position.protection.is_placed(),
            "Position opened"
        );

        self.book.insert(position.clone()).await;
        Ok(position)
    }

    /// Closes both legs and records realized P&L.
    ///
    /// # Errors
    /// `PositionNotFound`, `PositionBusy` while another execution holds the
    /// position, `PositionClosed`, or `Execution` if the exit failed.
    pub async fn close_position(&self, id: &str, reason: CloseReason) -> Result<ClosedPosition> {
        let entry = self.book.get(id).await?;
        let mut position = entry
            .position
            .try_lock()
            .map_err(|_| EngineError::PositionBusy(id.to_string()))?;
        if position.is_closed() {
            return Err(EngineError::PositionClosed(id.to_string()));
        }

        let still_resting = self
            .executor
            .cancel_orders(&position.protection.order_ids())
            .await;
        let exit = self
            .executor
            .execute_exit(
                &position.call.contract,
                &position.put.contract,
                position.lot_size,
                position.direction,
            )
            .await;

        let fills = match exit {
            Ok(fills) => fills,
            Err(err) => {
                self.recover_failed_exit(&mut position, &still_resting, &err)
                    .await;
                return Err(err.into());
            }
        };

        if !still_resting.is_empty() {
            warn!(
                position_id = %id,
                orders = ?still_resting,
                "Protective orders may still rest after close, cancel manually"
            );
        }
        position.protection = position
            .protection
            .retain_resting(&still_resting, "position closed");

        let call_exit = self.exit_price(&fills.call_order, position.call.entry_price).await;
        let put_exit = self.exit_price(&fills.put_order, position.put.entry_price).await;
        let exit_cost = entry_cost(call_exit, put_exit);
        let lots = Decimal::from(position.lot_size);
        let realized_pnl = match position.direction {
            Direction::Long => (exit_cost - position.entry_cost) * lots,
            Direction::Short => (position.entry_cost - exit_cost) * lots,
        };

        position.call.exit_order_id = Some(fills.call_order.order_id);
        position.call.exit_price = Some(call_exit);
        position.put.exit_order_id = Some(fills.put_order.order_id);
        position.put.exit_price = Some(put_exit);
        position.status = PositionStatus::Closed;
        position.close_reason = Some(reason);
        position.closed_at = Some(Utc::now());
        position.exit_cost = Some(exit_cost);
        position.realized_pnl = Some(realized_pnl);
        entry.closed.send_replace(true);

        info!(
            position_id = %id,
            reason = %reason,
            exit_cost = %exit_cost,
            realized_pnl = %realized_pnl,
            "Position closed"
        );

        Ok(ClosedPosition {
            id: id.to_string(),
            reason,
            exit_cost,
            realized_pnl,
            position: position.clone(),
        })
    }

    /// Restores stops after an exit that left both legs open, or records the
    /// stops still resting when it did not.
    async fn recover_failed_exit(
        &self,
        position: &mut StrategyPosition,
        still_resting: &[String],
        err: &ExecutionError,
    ) {
        let kept = position
            .protection
            .retain_resting(still_resting, format!("exit failed: {err}"));

        if !err.legs_unchanged() {
            position.protection = kept;
            error!(
                position_id = %position.id,
                error = %err,
                resting_stops = ?position.protection.order_ids(),
                "Exit failed with legs changed, reconcile manually"
            );
            return;
        }

        position.protection = self
            .executor
            .protect_legs(
                position,
                kept.call_order_id().map(str::to_string),
                kept.put_order_id().map(str::to_string),
            )
            .await;
        if position.status == PositionStatus::Triggered {
            position.status = PositionStatus::Open;
        }
        warn!(
            position_id = %position.id,
            error = %err,
            protected = position.protection.is_placed(),
            "Exit failed, both legs still open, stops restored"
        );
    }

    async fn exit_price(&self, order: &OrderHandle, fallback: Decimal) -> Decimal {
        if let Some(price) = order.avg_fill_price {
            return price;
        }
        match self.gateway().get_mark_price(&order.symbol).await {
            Ok(mark) => mark,
            Err(err) => {
                warn!(
                    symbol = %order.symbol,
                    error = %err,
                    "No fill price or mark for exit, using entry price"
                );
                fallback
            }
        }
    }

    /// Fetches marks for an open position and evaluates its exit rules.
    ///
    /// Returns `Ok(None)` while another execution holds the position.
    ///
    /// # Errors
    /// `PositionNotFound`, `PositionClosed`, or `MarketDataUnavailable`.
    pub async fn poll_tick(&self, id: &str) -> Result<Option<TriggerKind>> {
        let entry = self.book.get(id).await?;
        let snapshot = match entry.position.try_lock() {
            Ok(position) => position.clone(),
            Err(_) => {
                debug!(position_id = %id, "Execution in flight, skipping tick");
                return Ok(None);
            }
        };
        if snapshot.is_closed() {
            return Err(EngineError::PositionClosed(id.to_string()));
        }

        let (call_mark, put_mark) = self.position_marks(&snapshot).await?;
        Ok(Self::poll_tick_with_marks(&snapshot, call_mark, put_mark))
    }

    /// Evaluates a position snapshot against supplied marks.
    #[must_use]
    pub fn poll_tick_with_marks(
        position: &StrategyPosition,
        call_mark: Decimal,
        put_mark: Decimal,
    ) -> Option<TriggerKind> {
        if position.is_closed() {
            return None;
        }
        let snapshot = monitor::snapshot(position, call_mark, put_mark);
        debug!(
            position_id = %position.id,
            current_cost = %snapshot.current_cost,
            pnl_pct = %snapshot.pnl_pct,
            unrealized_pnl = %snapshot.unrealized_pnl,
            "Position evaluated"
        );
        monitor::evaluate(position, call_mark, put_mark)
    }

    async fn position_marks(&self, position: &StrategyPosition) -> Result<(Decimal, Decimal)> {
        self.marks(&MatchedContracts {
            call: position.call.contract.clone(),
            put: position.put.contract.clone(),
        })
        .await
    }

    /// Moves the protective stop of each leg in profit to its entry price.
    ///
    /// Legs not in profit keep their stops. A leg whose old stop cannot be
    /// cancelled keeps that stop and its previous levels.
    ///
    /// # Errors
    /// `NotProfitableYet` while neither leg is in profit, plus the lookup and
    /// locking errors of [`Self::close_position`].
    pub async fn move_position_to_cost(&self, id: &str) -> Result<CostStops> {
        let entry = self.book.get(id).await?;
        let mut position = entry
            .position
            .try_lock()
            .map_err(|_| EngineError::PositionBusy(id.to_string()))?;
        if position.is_closed() {
            return Err(EngineError::PositionClosed(id.to_string()));
        }

        let (call_mark, put_mark) = self.position_marks(&position).await?;
        let mut stops = monitor::move_to_cost(
            &position,
            call_mark,
            put_mark,
            self.config.execution.move_to_cost_limit_offset_pct,
        )?;

        let old = position.protection.clone();
        let moving: Vec<String> = [
            stops.call.and(old.call_order_id()),
            stops.put.and(old.put_order_id()),
        ]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();
        let still_resting = self.executor.cancel_orders(&moving).await;
        let stuck = |order_id: Option<&str>| {
            order_id.is_some_and(|order_id| still_resting.iter().any(|r| r == order_id))
        };

        if stuck(old.call_order_id()) {
            stops.call = None;
        }
        if stuck(old.put_order_id()) {
            stops.put = None;
        }
        let keep = |moved: bool, order_id: Option<&str>| {
            if moved {
                None
            } else {
                order_id.map(str::to_string)
            }
        };
        let keep_call = keep(stops.call.is_some(), old.call_order_id());
        let keep_put = keep(stops.put.is_some(), old.put_order_id());

        if let Some(levels) = stops.call {
            position.call.stop = Some(levels);
        }
        if let Some(levels) = stops.put {
            position.put.stop = Some(levels);
        }
        position.protection = self
            .executor
            .protect_legs(&position, keep_call, keep_put)
            .await;

        info!(
            position_id = %id,
            call_moved = stops.call.is_some(),
            put_moved = stops.put.is_some(),
            protected = position.protection.is_placed(),
            "Stops moved to cost"
        );
        Ok(stops)
    }

    /// Returns a snapshot of one position.
    ///
    /// # Errors
    /// `PositionNotFound`.
    pub async fn position(&self, id: &str) -> Result<StrategyPosition> {
        let entry = self.book.get(id).await?;
        let position = entry.position.lock().await;
        Ok(position.clone())
    }

    /// Snapshots of every position, open and closed.
    pub async fn positions(&self) -> Vec<StrategyPosition> {
        let mut positions = Vec::new();
        for entry in self.book.all().await {
            positions.push(entry.position.lock().await.clone());
        }
        positions.sort_by_key(|p| p.opened_at);
        positions
    }

    /// Stops every monitor task.
    pub fn shutdown(&self) {
        info!("Strategy engine shutting down");
        self.shutdown.send_replace(true);
    }

    fn mark_triggered(entry: &PositionEntry) {
        if let Ok(mut position) = entry.position.try_lock() {
            if position.status == PositionStatus::Open {
                position.status = PositionStatus::Triggered;
            }
        }
    }
}

impl<G: MarketGateway + 'static> StrategyEngine<G> {
    /// Starts the recurring monitor for a position.
    ///
    /// The task ends when the position closes, on engine shutdown, or after
    /// an automatic close fails in a way that changed a leg. A close that
    /// left both legs open is retried on the next tick.
    pub fn spawn_monitor(self: &Arc<Self>, position_id: impl Into<String>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let id = position_id.into();
        tokio::spawn(async move { engine.run_monitor(id).await })
    }

    async fn run_monitor(&self, id: String) {
        let entry = match self.book.get(&id).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(position_id = %id, error = %err, "Monitor not started");
                return;
            }
        };
        let mut closed = entry.closed.subscribe();
        let mut shutdown = self.shutdown.subscribe();

        let period = self.config.monitor.poll_interval().max(MIN_POLL_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(position_id = %id, poll_secs = period.as_secs(), "Position monitor started");

        loop {
            if *closed.borrow() || *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = closed.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let trigger = match self.poll_tick(&id).await {
                Ok(Some(trigger)) => trigger,
                Ok(None) => continue,
                Err(EngineError::PositionClosed(_)) => break,
                Err(err) => {
                    warn!(position_id = %id, error = %err, "Monitor tick skipped");
                    continue;
                }
            };

            Self::mark_triggered(&entry);
            match self.close_position(&id, trigger.into()).await {
                Ok(closed) => {
                    info!(
                        position_id = %id,
                        reason = %closed.reason,
                        realized_pnl = %closed.realized_pnl,
                        "Position closed by monitor"
                    );
                    break;
                }
                Err(EngineError::PositionBusy(_)) => {
                    debug!(position_id = %id, "Close already in flight");
                }
                Err(EngineError::PositionClosed(_)) => break,
                Err(EngineError::Execution(err)) if err.legs_unchanged() => {
                    warn!(
                        position_id = %id,
                        error = %err,
                        "Automatic close failed cleanly, retrying on next tick"
                    );
                }
                Err(err) => {
                    error!(
                        position_id = %id,
                        error = %err,
                        "Automatic close failed, monitor stopped for manual reconciliation"
                    );
                    break;
                }
            }
        }

        info!(position_id = %id, "Position monitor stopped");
    }
}
