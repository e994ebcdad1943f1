//! Two-leg order execution with a single compensating rollback.
//!
//! Entry and exit both run the same pair routine: call leg first, put leg
//! only after the call leg has filled. A failed put leg after a filled call
//! leg triggers exactly one compensating market order on the call contract.
//! Outcomes the venue has not confirmed are reported as ambiguous and never
//! retried.

use serde::{Deserialize, Serialize};
use straddle_core::{
    Contract, ExecutionConfig, GatewayError, MarketGateway, OrderHandle, OrderRequest, OrderState,
};
use tokio::time::Instant;

use crate::error::{ExecutionError, RollbackOutcome};
use crate::types::{Direction, Leg, StrategyPosition};

// =============================================================================
// Types
// =============================================================================

/// States of a two-leg execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Preparing,
    CallPlaced,
    BothPlaced,
    RollingBack,
    Failed,
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preparing => write!(f, "preparing"),
            Self::CallPlaced => write!(f, "call_placed"),
            Self::BothPlaced => write!(f, "both_placed"),
            Self::RollingBack => write!(f, "rolling_back"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Filled orders of both legs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegFills {
    pub call_order: OrderHandle,
    pub put_order: OrderHandle,
}

/// Protective stop orders attached to an open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Protection {
    /// A resting stop on each leg.
    Placed {
        call_order_id: String,
        put_order_id: String,
    },
    /// At least one leg has no resting stop. The position is live and
    /// needs manual attention.
    Failed {
        call_order_id: Option<String>,
        put_order_id: Option<String>,
        reason: String,
    },
}

impl Protection {
    /// No stop on either leg.
    pub fn unplaced(reason: impl Into<String>) -> Self {
        Self::Failed {
            call_order_id: None,
            put_order_id: None,
            reason: reason.into(),
        }
    }

    /// `Placed` when both legs have a stop, `Failed` with `reason` otherwise.
    pub fn from_legs(
        call_order_id: Option<String>,
        put_order_id: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        match (call_order_id, put_order_id) {
            (Some(call_order_id), Some(put_order_id)) => Self::Placed {
                call_order_id,
                put_order_id,
            },
            (call_order_id, put_order_id) => Self::Failed {
                call_order_id,
                put_order_id,
                reason: reason.into(),
            },
        }
    }

    #[must_use]
    pub fn is_placed(&self) -> bool {
        matches!(self, Self::Placed { .. })
    }

    #[must_use]
    pub fn call_order_id(&self) -> Option<&str> {
        match self {
            Self::Placed { call_order_id, .. } => Some(call_order_id),
            Self::Failed { call_order_id, .. } => call_order_id.as_deref(),
        }
    }

    #[must_use]
    pub fn put_order_id(&self) -> Option<&str> {
        match self {
            Self::Placed { put_order_id, .. } => Some(put_order_id),
            Self::Failed { put_order_id, .. } => put_order_id.as_deref(),
        }
    }

    /// Ids of every resting protective order.
    #[must_use]
    pub fn order_ids(&self) -> Vec<String> {
        self.call_order_id()
            .into_iter()
            .chain(self.put_order_id())
            .map(str::to_string)
            .collect()
    }

    /// Keeps only the stops listed in `resting`.
    #[must_use]
    pub fn retain_resting(&self, resting: &[String], reason: impl Into<String>) -> Self {
        let keep = |id: Option<&str>| {
            id.filter(|id| resting.iter().any(|r| r == id))
                .map(str::to_string)
        };
        Self::from_legs(
            keep(self.call_order_id()),
            keep(self.put_order_id()),
            reason,
        )
    }
}

/// Confirmed outcome of a single market order.
#[derive(Debug)]
enum LegOutcome {
    Filled(OrderHandle),
    Failed(String),
    Ambiguous(String),
}

/// Whether a failed write may still have reached the venue.
fn outcome_unknown(err: &GatewayError) -> bool {
    matches!(
        err,
        GatewayError::Ambiguous { .. } | GatewayError::Network(_) | GatewayError::Timeout(_)
    )
}

fn advance(state: &mut EntryState, next: EntryState, action: &str) {
    tracing::debug!(action, from = %state, to = %next, "Execution state transition");
    *state = next;
}

// =============================================================================
// Multi-Leg Executor
// =============================================================================

/// Places call/put pairs and their protective stops.
pub struct MultiLegExecutor<G> {
    gateway: G,
    config: ExecutionConfig,
}

impl<G: MarketGateway> MultiLegExecutor<G> {
    #[must_use]
    pub fn new(gateway: G, config: ExecutionConfig) -> Self {
        Self { gateway, config }
    }

    /// Returns a reference to the underlying gateway.
    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Submits an order once and waits for a terminal state.
    async fn submit_and_confirm(&self, order: &OrderRequest) -> LegOutcome {
        let mut handle = match self.gateway.place_order(order).await {
            Ok(handle) => handle,
            Err(err) if outcome_unknown(&err) => return LegOutcome::Ambiguous(err.to_string()),
            Err(err) => return LegOutcome::Failed(err.to_string()),
        };

        let deadline = Instant::now() + self.config.fill_timeout();
        while !handle.state.is_terminal() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    order_id = %handle.order_id,
                    symbol = %order.symbol,
                    timeout_secs = self.config.fill_timeout_secs,
                    "Order not confirmed before fill timeout"
                );
                return LegOutcome::Ambiguous(format!(
                    "order {} still {} after {}s",
                    handle.order_id, handle.state, self.config.fill_timeout_secs
                ));
            }

            tokio::time::sleep(self.config.fill_poll_interval()).await;

            match self.gateway.get_order_status(&handle.order_id).await {
                Ok(latest) => handle = latest,
                Err(err) => {
                    tracing::warn!(
                        order_id = %handle.order_id,
                        error = %err,
                        "Order status check failed"
                    );
                }
            }
        }

        match handle.state {
            OrderState::Filled => LegOutcome::Filled(handle),
            OrderState::PartiallyFilled { filled } => {
                tracing::warn!(
                    order_id = %handle.order_id,
                    symbol = %order.symbol,
                    filled,
                    quantity = handle.quantity,
                    "Order finished partially filled"
                );
                LegOutcome::Ambiguous(format!(
                    "order {} partially filled: {filled} of {}",
                    handle.order_id, handle.quantity
                ))
            }
            state => LegOutcome::Failed(format!("order {} {state}", handle.order_id)),
        }
    }

    /// Opens both legs with market orders.
    ///
    /// # Errors
    /// `CallLegFailed` when the first leg does not fill, `PutLegFailed` when
    /// the second one does not, carrying the rollback outcome.
    pub async fn execute_entry(
        &self,
        call: &Contract,
        put: &Contract,
        lot_size: u32,
        direction: Direction,
    ) -> Result<LegFills, ExecutionError> {
        let side = direction.entry_side();
        tracing::info!(
            call = %call.symbol,
            put = %put.symbol,
            lot_size,
            %direction,
            "Executing entry"
        );
        self.execute_pair(
            "entry",
            OrderRequest::market(call, side, lot_size),
            OrderRequest::market(put, side, lot_size),
            true,
        )
        .await
    }

    /// Closes both legs with reduce-only market orders.
    ///
    /// Resting protective orders are the caller's to cancel beforehand.
    ///
    /// # Errors
    /// Same as [`Self::execute_entry`]. A rollback here re-opens the call leg.
    pub async fn execute_exit(
        &self,
        call: &Contract,
        put: &Contract,
        lot_size: u32,
        direction: Direction,
    ) -> Result<LegFills, ExecutionError> {
        let side = direction.exit_side();
        tracing::info!(
            call = %call.symbol,
            put = %put.symbol,
            lot_size,
            %direction,
            "Executing exit"
        );
        self.execute_pair(
            "exit",
            OrderRequest::market(call, side, lot_size).reduce_only(),
            OrderRequest::market(put, side, lot_size).reduce_only(),
            false,
        )
        .await
    }

    async fn execute_pair(
        &self,
        action: &str,
        call_order: OrderRequest,
        put_order: OrderRequest,
        rollback_reduce_only: bool,
    ) -> Result<LegFills, ExecutionError> {
        let mut state = EntryState::Preparing;

        let call_fill = match self.submit_and_confirm(&call_order).await {
            LegOutcome::Filled(handle) => handle,
            LegOutcome::Failed(reason) => {
                advance(&mut state, EntryState::Failed, action);
                tracing::warn!(symbol = %call_order.symbol, %reason, action, "Call leg failed");
                return Err(ExecutionError::CallLegFailed {
                    symbol: call_order.symbol,
                    reason,
                    ambiguous: false,
                });
            }
            LegOutcome::Ambiguous(reason) => {
                advance(&mut state, EntryState::Failed, action);
                tracing::error!(
                    symbol = %call_order.symbol,
                    %reason,
                    action,
                    "Call leg outcome unknown, reconcile manually"
                );
                return Err(ExecutionError::CallLegFailed {
                    symbol: call_order.symbol,
                    reason,
                    ambiguous: true,
                });
            }
        };
        advance(&mut state, EntryState::CallPlaced, action);

        let (reason, ambiguous) = match self.submit_and_confirm(&put_order).await {
            LegOutcome::Filled(put_fill) => {
                advance(&mut state, EntryState::BothPlaced, action);
                tracing::info!(
                    action,
                    call_order_id = %call_fill.order_id,
                    put_order_id = %put_fill.order_id,
                    "Both legs filled"
                );
                return Ok(LegFills {
                    call_order: call_fill,
                    put_order: put_fill,
                });
            }
            LegOutcome::Failed(reason) => (reason, false),
            LegOutcome::Ambiguous(reason) => (reason, true),
        };

        if ambiguous {
            // the put may still fill; compensating now would act on unknown state
            advance(&mut state, EntryState::Failed, action);
            tracing::error!(
                symbol = %put_order.symbol,
                call_order_id = %call_fill.order_id,
                %reason,
                action,
                "Put leg outcome unknown, no rollback sent"
            );
            return Err(ExecutionError::PutLegFailed {
                call_order: call_fill,
                symbol: put_order.symbol,
                reason,
                ambiguous: true,
                rollback_attempted: false,
                rollback_result: None,
            });
        }

        advance(&mut state, EntryState::RollingBack, action);
        tracing::warn!(
            symbol = %put_order.symbol,
            %reason,
            action,
            "Put leg failed, rolling back call leg"
        );
        let rollback = self.rollback(&call_order, &call_fill, rollback_reduce_only).await;
        advance(&mut state, EntryState::Failed, action);

        Err(ExecutionError::PutLegFailed {
            call_order: call_fill,
            symbol: put_order.symbol,
            reason,
            ambiguous: false,
            rollback_attempted: true,
            rollback_result: Some(rollback),
        })
    }

    /// Sends the single compensating order for a filled call leg.
    async fn rollback(
        &self,
        call_order: &OrderRequest,
        call_fill: &OrderHandle,
        reduce_only: bool,
    ) -> RollbackOutcome {
        let compensating = OrderRequest {
            side: call_fill.side.opposite(),
            quantity: call_fill.filled_quantity(),
            kind: straddle_core::OrderKind::Market,
            reduce_only,
            ..call_order.clone()
        };

        let outcome = match self.submit_and_confirm(&compensating).await {
            LegOutcome::Filled(order) => RollbackOutcome::Completed { order },
            LegOutcome::Failed(reason) => RollbackOutcome::Failed { reason },
            LegOutcome::Ambiguous(reason) => RollbackOutcome::Ambiguous { reason },
        };

        if outcome.is_completed() {
            tracing::info!(symbol = %compensating.symbol, "Rollback completed");
        } else {
            tracing::error!(
                symbol = %compensating.symbol,
                outcome = %outcome,
                "Rollback did not complete, call leg exposure remains"
            );
        }
        outcome
    }

    /// Places one reduce-only stop-limit exit order per leg.
    ///
    /// Stops sit on the loss side of the combined premium, which is a rising
    /// premium for both directions. For long positions the sell stops are
    /// therefore above the current mark and execute only once premium climbs
    /// to the trigger. Failures never unwind the entry.
    pub async fn place_protection(&self, position: &StrategyPosition) -> Protection {
        self.protect_legs(position, None, None).await
    }

    /// Places stops for the legs without a kept order id.
    ///
    /// Every missing leg is attempted even after an earlier failure.
    pub async fn protect_legs(
        &self,
        position: &StrategyPosition,
        keep_call: Option<String>,
        keep_put: Option<String>,
    ) -> Protection {
        let mut reasons = Vec::new();
        let mut ids = [keep_call, keep_put];

        for (slot, leg) in ids.iter_mut().zip([&position.call, &position.put]) {
            if slot.is_some() {
                continue;
            }
            match self.place_leg_stop(position, leg).await {
                Ok(order_id) => *slot = Some(order_id),
                Err(reason) => reasons.push(reason),
            }
        }

        let [call_order_id, put_order_id] = ids;
        Protection::from_legs(call_order_id, put_order_id, reasons.join("; "))
    }

    async fn place_leg_stop(&self, position: &StrategyPosition, leg: &Leg) -> Result<String, String> {
        let levels = position.leg_stop(leg);
        let order = OrderRequest::stop_limit(
            &leg.contract,
            position.direction.exit_side(),
            position.lot_size,
            levels.trigger,
            levels.limit,
        );

        match self.gateway.place_order(&order).await {
            Ok(handle) => {
                tracing::info!(
                    position_id = %position.id,
                    symbol = %leg.contract.symbol,
                    order_id = %handle.order_id,
                    trigger = %levels.trigger,
                    limit = %levels.limit,
                    "Protective stop placed"
                );
                Ok(handle.order_id)
            }
            Err(err) => {
                tracing::error!(
                    position_id = %position.id,
                    symbol = %leg.contract.symbol,
                    error = %err,
                    "Protective stop placement failed, position is live without full protection"
                );
                Err(format!("{}: {err}", leg.contract.symbol))
            }
        }
    }

    /// Cancels orders one by one, logging failures.
    ///
    /// Returns the ids that may still be resting. An order the venue no
    /// longer knows counts as gone.
    pub async fn cancel_orders(&self, order_ids: &[String]) -> Vec<String> {
        let mut resting = Vec::new();
        for order_id in order_ids {
            match self.gateway.cancel_order(order_id).await {
                Ok(()) | Err(GatewayError::NotFound(_)) => {}
                Err(err) => {
                    tracing::warn!(order_id = %order_id, error = %err, "Failed to cancel order");
                    resting.push(order_id.clone());
                }
            }
        }
        resting
    }
}
