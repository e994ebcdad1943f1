//! End-to-end scenarios for the strategy engine against the paper venue.
//!
//! Covers:
//! - Preview for straddles and strangles, and its idempotence
//! - Margin refusal before any order is sent
//! - Entry rollback and ambiguous second legs
//! - Protective stop failure on a live position
//! - Close, realized P&L and per-position locking
//! - Exits that fail, with stops restored or kept
//! - Monitor task lifecycle and move-to-cost

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use straddle_core::{
    Contract, ExpiryClass, GatewayError, MarketGateway, OptionChain, OptionKind, OrderHandle,
    OrderKind, OrderRequest, SpotQuote, WalletBalance,
};
use straddle_delta::{PaperGateway, PaperGatewayConfig};
use straddle_engine::{
    CloseReason, Direction, EngineConfig, EngineError, ExecutionError, Moneyness,
    PositionStatus, PriceRule, PriceUnit, RollbackOutcome, StrategyEngine, StrategyParams,
    StrikeMethod,
};

// =============================================================================
// Helper Functions
// =============================================================================

const EXPIRY: &str = "241025";

fn symbol(kind: OptionKind, strike: u32) -> String {
    let prefix = match kind {
        OptionKind::Call => "C",
        OptionKind::Put => "P",
    };
    format!("{prefix}-BTC-{strike}-{EXPIRY}")
}

/// Paper venue with BTC at 60400 and a five-strike chain.
///
/// ATM marks: call 1200, put 900. Wings: 62000 call 400, 58000 put 350.
fn paper_venue(config: PaperGatewayConfig) -> PaperGateway {
    let paper = PaperGateway::new(config);
    paper.set_spot("BTC", dec!(60400));

    for (i, strike) in [58000u32, 59000, 60000, 61000, 62000].into_iter().enumerate() {
        for kind in [OptionKind::Call, OptionKind::Put] {
            paper.add_contract(Contract {
                symbol: symbol(kind, strike),
                underlying: "BTC".to_string(),
                kind,
                strike: Decimal::from(strike),
                expiry: EXPIRY.to_string(),
                expiry_date: None,
                product_id: (i * 2) as i64 + i64::from(kind == OptionKind::Put),
            });
        }
    }

    paper.set_mark(&symbol(OptionKind::Call, 60000), dec!(1200));
    paper.set_mark(&symbol(OptionKind::Put, 60000), dec!(900));
    paper.set_mark(&symbol(OptionKind::Call, 62000), dec!(400));
    paper.set_mark(&symbol(OptionKind::Put, 58000), dec!(350));
    paper
}

fn straddle_params(direction: Direction) -> StrategyParams {
    StrategyParams {
        underlying: "BTC".to_string(),
        expiry: ExpiryClass::Weekly,
        method: StrikeMethod::AtmOffset { steps: 0 },
        lot_size: 1,
        direction,
        stop_trigger: PriceRule::new(PriceUnit::Percentage, dec!(50)),
        stop_limit: PriceRule::new(PriceUnit::Percentage, dec!(55)),
        target: None,
        stop_loss_pct: dec!(20),
        target_pct: Some(dec!(40)),
    }
}

fn strangle_params() -> StrategyParams {
    StrategyParams {
        method: StrikeMethod::Percentage {
            moneyness: Moneyness::Otm,
            value: dec!(5),
        },
        ..straddle_params(Direction::Long)
    }
}

fn engine(paper: PaperGateway) -> StrategyEngine<PaperGateway> {
    StrategyEngine::new(paper, EngineConfig::default().with_poll_interval_secs(1))
}

/// Rejects every order from the `reject_from`-th submission (zero based)
/// until `reject_until`.
struct RejectingGateway {
    inner: PaperGateway,
    reject_from: usize,
    reject_until: usize,
    fail_cancels: bool,
    submitted: AtomicUsize,
}

impl RejectingGateway {
    fn new(inner: PaperGateway, reject_from: usize) -> Self {
        Self {
            inner,
            reject_from,
            reject_until: usize::MAX,
            fail_cancels: false,
            submitted: AtomicUsize::new(0),
        }
    }

    /// Rejects only `count` submissions.
    fn only(mut self, count: usize) -> Self {
        self.reject_until = self.reject_from + count;
        self
    }

    fn failing_cancels(mut self) -> Self {
        self.fail_cancels = true;
        self
    }
}

#[async_trait]
impl MarketGateway for RejectingGateway {
    async fn get_spot_price(&self, underlying: &str) -> straddle_core::error::Result<SpotQuote> {
        self.inner.get_spot_price(underlying).await
    }

    async fn get_option_chain(
        &self,
        underlying: &str,
        expiry_class: ExpiryClass,
    ) -> straddle_core::error::Result<OptionChain> {
        self.inner.get_option_chain(underlying, expiry_class).await
    }

    async fn get_mark_price(&self, symbol: &str) -> straddle_core::error::Result<Decimal> {
        self.inner.get_mark_price(symbol).await
    }

    async fn place_order(&self, order: &OrderRequest) -> straddle_core::error::Result<OrderHandle> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst);
        if (self.reject_from..self.reject_until).contains(&n) {
            return Err(GatewayError::rejected("insufficient liquidity"));
        }
        self.inner.place_order(order).await
    }

    async fn get_order_status(&self, order_id: &str) -> straddle_core::error::Result<OrderHandle> {
        self.inner.get_order_status(order_id).await
    }

    async fn cancel_order(&self, order_id: &str) -> straddle_core::error::Result<()> {
        if self.fail_cancels {
            return Err(GatewayError::Network("connection reset".to_string()));
        }
        self.inner.cancel_order(order_id).await
    }

    async fn get_wallet_balance(&self, asset: &str) -> straddle_core::error::Result<WalletBalance> {
        self.inner.get_wallet_balance(asset).await
    }
}

// =============================================================================
// Preview
// =============================================================================

#[tokio::test]
async fn test_straddle_preview() {
    let engine = engine(paper_venue(PaperGatewayConfig::default()));

    let preview = engine
        .compute_preview(&straddle_params(Direction::Long))
        .await
        .unwrap();

    assert_eq!(preview.expiry, EXPIRY);
    assert_eq!(preview.strikes.atm, dec!(60000));
    assert!(preview.is_straddle());
    assert_eq!(preview.entry_cost, dec!(2100));
    assert_eq!(preview.risk.trigger, dec!(3150));
    assert_eq!(preview.risk.limit, dec!(3255));
    assert_eq!(preview.breakeven.upper, dec!(62100));
    assert_eq!(preview.breakeven.lower, dec!(57900));
    assert!(preview.margin.is_sufficient());
    assert_eq!(preview.margin.required(), dec!(2520));
    assert!(preview.straddle_comparison.is_none());
}

#[tokio::test]
async fn test_strangle_preview_compares_with_straddle() {
    let engine = engine(paper_venue(PaperGatewayConfig::default()));

    let preview = engine.compute_preview(&strangle_params()).await.unwrap();

    assert_eq!(preview.contracts.call.strike, dec!(62000));
    assert_eq!(preview.contracts.put.strike, dec!(58000));
    assert_eq!(preview.entry_cost, dec!(750));

    let comparison = preview.straddle_comparison.unwrap();
    assert_eq!(comparison.straddle_premium, dec!(2100));
    assert_eq!(comparison.savings, dec!(1350));
    assert_eq!(comparison.savings_pct, dec!(64.29));
}

#[tokio::test]
async fn test_preview_is_idempotent_and_side_effect_free() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = engine(paper.clone());
    let params = strangle_params();

    let first = engine.compute_preview(&params).await.unwrap();
    let second = engine.compute_preview(&params).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(paper.orders_submitted(), 0);
    assert_eq!(paper.balance(), dec!(10000));
}

#[tokio::test]
async fn test_preview_rejects_invalid_params_locally() {
    // no spot scripted: a network lookup would fail with MarketDataUnavailable
    let engine = engine(PaperGateway::new(PaperGatewayConfig::default()));
    let params = StrategyParams {
        lot_size: 0,
        ..straddle_params(Direction::Long)
    };

    let err = engine.compute_preview(&params).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter(_)));
}

#[tokio::test]
async fn test_preview_without_listing_is_no_match() {
    let paper = PaperGateway::new(PaperGatewayConfig::default());
    paper.set_spot("BTC", dec!(60400));
    let engine = engine(paper);

    let err = engine
        .compute_preview(&straddle_params(Direction::Long))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoMatchingContract(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_open_refuses_stop_limit_below_trigger() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = engine(paper.clone());

    let same_unit = StrategyParams {
        stop_limit: PriceRule::new(PriceUnit::Percentage, dec!(10)),
        ..straddle_params(Direction::Short)
    };
    let err = engine.open_position(&same_unit).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter(_)));

    // trigger 3150, limit 2100 + 500
    let mixed_units = StrategyParams {
        stop_limit: PriceRule::new(PriceUnit::Absolute, dec!(500)),
        ..straddle_params(Direction::Short)
    };
    let err = engine.open_position(&mixed_units).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter(_)));

    assert_eq!(paper.orders_submitted(), 0);
    assert!(engine.positions().await.is_empty());
}

// =============================================================================
// Open
// =============================================================================

#[tokio::test]
async fn test_insufficient_margin_sends_no_orders() {
    let paper = paper_venue(PaperGatewayConfig::with_balance(dec!(2000)));
    let engine = engine(paper.clone());

    let err = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::InsufficientMargin {
            required: dec!(2520),
            available: dec!(2000),
        }
    );
    assert_eq!(paper.orders_submitted(), 0);
}

#[tokio::test]
async fn test_open_places_entry_and_protection() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = engine(paper.clone());

    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    assert_eq!(position.status, PositionStatus::Open);
    assert_eq!(position.entry_cost, dec!(2100));
    assert_eq!(position.call.entry_price, dec!(1200));
    assert!(position.protection.is_placed());
    assert_eq!(paper.orders_submitted(), 4);
    assert_eq!(paper.open_orders().len(), 2);
    assert_eq!(paper.balance(), dec!(7900));

    let stops: Vec<_> = paper
        .order_history()
        .into_iter()
        .filter(|o| o.kind.is_stop())
        .collect();
    assert_eq!(
        stops[0].kind,
        straddle_core::OrderKind::StopLimit {
            trigger: dec!(1800),
            limit: dec!(1860),
        }
    );
    assert_eq!(
        stops[1].kind,
        straddle_core::OrderKind::StopLimit {
            trigger: dec!(1350),
            limit: dec!(1395),
        }
    );

    assert_eq!(engine.positions().await.len(), 1);
}

#[tokio::test]
async fn test_put_rejection_rolls_back_call_once() {
    let paper = paper_venue(PaperGatewayConfig::default());
    paper.reject_symbol(&symbol(OptionKind::Put, 60000));
    let engine = engine(paper.clone());

    let err = engine
        .open_position(&StrategyParams {
            lot_size: 2,
            ..straddle_params(Direction::Long)
        })
        .await
        .unwrap_err();

    match err {
        EngineError::Execution(ExecutionError::PutLegFailed {
            rollback_attempted,
            rollback_result,
            ..
        }) => {
            assert!(rollback_attempted);
            assert!(rollback_result.unwrap().is_completed());
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let history = paper.order_history();
    assert_eq!(history.len(), 3);
    let rollback = &history[2];
    assert_eq!(rollback.symbol, symbol(OptionKind::Call, 60000));
    assert_eq!(rollback.side, straddle_core::Side::Sell);
    assert_eq!(rollback.quantity, 2);
    assert_eq!(paper.balance(), dec!(10000));
    assert!(engine.positions().await.is_empty());
}

#[tokio::test]
async fn test_failed_rollback_is_reported_and_not_repeated() {
    let gateway = RejectingGateway::new(paper_venue(PaperGatewayConfig::default()), 1);
    let engine = StrategyEngine::new(gateway, EngineConfig::default());

    let err = engine
        .open_position(&straddle_params(Direction::Short))
        .await
        .unwrap_err();

    match &err {
        EngineError::Execution(ExecutionError::PutLegFailed {
            rollback_attempted: true,
            rollback_result: Some(RollbackOutcome::Failed { reason }),
            ..
        }) => assert!(reason.contains("insufficient liquidity")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(engine.gateway().submitted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_ambiguous_put_is_surfaced_without_rollback() {
    let paper = paper_venue(PaperGatewayConfig::default());
    paper.ambiguous_symbol(&symbol(OptionKind::Put, 60000));
    let engine = engine(paper.clone());

    let err = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap_err();

    match err {
        EngineError::Execution(exec) => {
            assert!(exec.is_ambiguous());
            assert!(matches!(
                exec,
                ExecutionError::PutLegFailed {
                    rollback_attempted: false,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(paper.orders_submitted(), 2);
}

#[tokio::test]
async fn test_protection_failure_keeps_position_live() {
    let paper = paper_venue(PaperGatewayConfig::default());
    paper.reject_stop_orders(true);
    let engine = engine(paper.clone());

    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    assert!(!position.protection.is_placed());
    assert_eq!(position.status, PositionStatus::Open);
    assert_eq!(engine.position(&position.id).await.unwrap().id, position.id);
}

// =============================================================================
// Close
// =============================================================================

#[tokio::test]
async fn test_close_long_realizes_pnl() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = engine(paper.clone());
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    paper.set_mark(&symbol(OptionKind::Call, 60000), dec!(1500));
    paper.set_mark(&symbol(OptionKind::Put, 60000), dec!(1000));

    let closed = engine
        .close_position(&position.id, CloseReason::Manual)
        .await
        .unwrap();

    assert_eq!(closed.exit_cost, dec!(2500));
    assert_eq!(closed.realized_pnl, dec!(400));
    assert_eq!(closed.position.status, PositionStatus::Closed);
    assert_eq!(closed.position.call.exit_price, Some(dec!(1500)));
    assert_eq!(paper.cancellations(), 2);
    assert!(paper.open_orders().is_empty());

    let again = engine
        .close_position(&position.id, CloseReason::Manual)
        .await
        .unwrap_err();
    assert!(matches!(again, EngineError::PositionClosed(_)));
}

#[tokio::test]
async fn test_close_short_realizes_pnl() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = engine(paper.clone());
    let position = engine
        .open_position(&StrategyParams {
            lot_size: 2,
            ..straddle_params(Direction::Short)
        })
        .await
        .unwrap();

    paper.set_mark(&symbol(OptionKind::Call, 60000), dec!(1000));
    paper.set_mark(&symbol(OptionKind::Put, 60000), dec!(800));

    let closed = engine
        .close_position(&position.id, CloseReason::Target)
        .await
        .unwrap();
    assert_eq!(closed.realized_pnl, dec!(600));
    assert_eq!(closed.reason, CloseReason::Target);
}

#[tokio::test]
async fn test_unknown_position() {
    let engine = engine(paper_venue(PaperGatewayConfig::default()));
    assert!(matches!(
        engine.close_position("missing", CloseReason::Manual).await,
        Err(EngineError::PositionNotFound(_))
    ));
    assert!(matches!(
        engine.poll_tick("missing").await,
        Err(EngineError::PositionNotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_close_is_busy() {
    let paper = paper_venue(PaperGatewayConfig::default().latency_ms(100));
    let engine = Arc::new(engine(paper));
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    let first = {
        let engine = Arc::clone(&engine);
        let id = position.id.clone();
        tokio::spawn(async move { engine.close_position(&id, CloseReason::Manual).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = engine.close_position(&position.id, CloseReason::StopLoss).await;
    assert!(matches!(second, Err(EngineError::PositionBusy(_))));
    // a tick during the close is skipped, not an error
    assert_eq!(engine.poll_tick(&position.id).await.unwrap(), None);

    let closed = first.await.unwrap().unwrap();
    assert_eq!(closed.reason, CloseReason::Manual);
}

// =============================================================================
// Monitoring
// =============================================================================

#[tokio::test]
async fn test_poll_tick_detects_stop_loss() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = engine(paper.clone());
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    assert_eq!(engine.poll_tick(&position.id).await.unwrap(), None);

    paper.set_mark(&symbol(OptionKind::Call, 60000), dec!(700));
    paper.set_mark(&symbol(OptionKind::Put, 60000), dec!(500));
    assert_eq!(
        engine.poll_tick(&position.id).await.unwrap(),
        Some(straddle_engine::TriggerKind::StopLoss)
    );
}

#[tokio::test(start_paused = true)]
async fn test_monitor_closes_on_stop_loss() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = Arc::new(engine(paper.clone()));
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    paper.set_mark(&symbol(OptionKind::Call, 60000), dec!(600));
    paper.set_mark(&symbol(OptionKind::Put, 60000), dec!(400));

    let handle = engine.spawn_monitor(position.id.clone());
    tokio::time::timeout(Duration::from_secs(60), handle)
        .await
        .expect("monitor should stop after closing")
        .unwrap();

    let closed = engine.position(&position.id).await.unwrap();
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.close_reason, Some(CloseReason::StopLoss));
    assert_eq!(closed.realized_pnl, Some(dec!(-1100)));
}

#[tokio::test(start_paused = true)]
async fn test_monitor_stops_after_manual_close() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = Arc::new(engine(paper.clone()));
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    let handle = engine.spawn_monitor(position.id.clone());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!handle.is_finished());

    engine
        .close_position(&position.id, CloseReason::Manual)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(60), handle)
        .await
        .expect("monitor should observe the close")
        .unwrap();
    // entry + stops + exit only; no evaluation after close placed anything
    assert_eq!(paper.orders_submitted(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_stops_on_shutdown() {
    let engine = Arc::new(engine(paper_venue(PaperGatewayConfig::default())));
    let position = engine
        .open_position(&straddle_params(Direction::Short))
        .await
        .unwrap();

    let handle = engine.spawn_monitor(position.id.clone());
    tokio::time::sleep(Duration::from_secs(3)).await;
    engine.shutdown();

    tokio::time::timeout(Duration::from_secs(60), handle)
        .await
        .expect("monitor should observe shutdown")
        .unwrap();
    assert_eq!(
        engine.position(&position.id).await.unwrap().status,
        PositionStatus::Open
    );
}

#[tokio::test]
async fn test_move_to_cost_replaces_protection() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = engine(paper.clone());
    let position = engine
        .open_position(&straddle_params(Direction::Short))
        .await
        .unwrap();

    let err = engine.move_position_to_cost(&position.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotProfitableYet { .. }));
    assert_eq!(paper.cancellations(), 0);

    paper.set_mark(&symbol(OptionKind::Call, 60000), dec!(1000));
    paper.set_mark(&symbol(OptionKind::Put, 60000), dec!(800));

    let stops = engine.move_position_to_cost(&position.id).await.unwrap();
    let call = stops.call.unwrap();
    assert_eq!(call.trigger, dec!(1200));
    assert_eq!(call.limit, dec!(1224));
    assert_eq!(stops.put.unwrap().trigger, dec!(900));

    let updated = engine.position(&position.id).await.unwrap();
    assert_eq!(updated.call.stop, Some(call));
    assert!(updated.protection.is_placed());
    assert_ne!(updated.protection, position.protection);
    assert_eq!(paper.cancellations(), 2);
    assert_eq!(paper.open_orders().len(), 2);
}

#[tokio::test]
async fn test_move_to_cost_leaves_losing_leg_stop_alone() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let engine = engine(paper.clone());
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    // combined premium is up, but only the call leg is
    paper.set_mark(&symbol(OptionKind::Call, 60000), dec!(1700));
    paper.set_mark(&symbol(OptionKind::Put, 60000), dec!(600));

    let stops = engine.move_position_to_cost(&position.id).await.unwrap();
    assert_eq!(stops.call.unwrap().trigger, dec!(1200));
    assert_eq!(stops.put, None);

    let updated = engine.position(&position.id).await.unwrap();
    assert_eq!(updated.put.stop, None);
    assert_eq!(
        updated.protection.put_order_id(),
        position.protection.put_order_id()
    );
    assert_ne!(
        updated.protection.call_order_id(),
        position.protection.call_order_id()
    );
    assert_eq!(paper.cancellations(), 1);

    let sell_stops: Vec<_> = paper
        .order_history()
        .into_iter()
        .filter(|o| o.kind.is_stop())
        .collect();
    assert_eq!(sell_stops.len(), 3);
    let moved = &sell_stops[2];
    assert_eq!(moved.symbol, symbol(OptionKind::Call, 60000));
    assert_eq!(
        moved.kind,
        OrderKind::StopLimit {
            trigger: dec!(1200),
            limit: dec!(1176)
        }
    );
}

// =============================================================================
// Exit Failures
// =============================================================================

#[tokio::test]
async fn test_rejected_exit_restores_protection() {
    let paper = paper_venue(PaperGatewayConfig::default());
    // entry 0-1, stops 2-3, exit call 4
    let gateway = RejectingGateway::new(paper.clone(), 4).only(1);
    let engine = StrategyEngine::new(gateway, EngineConfig::default());
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();
    assert!(position.protection.is_placed());

    let err = engine
        .close_position(&position.id, CloseReason::Manual)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Execution(ExecutionError::CallLegFailed {
            ambiguous: false,
            ..
        })
    ));

    let after = engine.position(&position.id).await.unwrap();
    assert_eq!(after.status, PositionStatus::Open);
    assert!(after.protection.is_placed());
    assert_ne!(after.protection, position.protection);
    assert_eq!(paper.cancellations(), 2);
    assert_eq!(paper.open_orders().len(), 2);

    // a later close goes through
    let closed = engine
        .close_position(&position.id, CloseReason::Manual)
        .await
        .unwrap();
    assert_eq!(closed.position.status, PositionStatus::Closed);
    assert!(paper.open_orders().is_empty());
}

#[tokio::test]
async fn test_exit_put_rejection_reopens_call_and_restores_protection() {
    let paper = paper_venue(PaperGatewayConfig::default());
    // entry 0-1, stops 2-3, exit call 4, exit put 5
    let gateway = RejectingGateway::new(paper.clone(), 5).only(1);
    let engine = StrategyEngine::new(gateway, EngineConfig::default());
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    let err = engine
        .close_position(&position.id, CloseReason::Manual)
        .await
        .unwrap_err();
    match &err {
        EngineError::Execution(ExecutionError::PutLegFailed {
            rollback_attempted: true,
            rollback_result: Some(RollbackOutcome::Completed { .. }),
            ..
        }) => {}
        other => panic!("unexpected error: {other:?}"),
    }

    let market_orders: Vec<_> = paper
        .order_history()
        .into_iter()
        .filter(|o| !o.kind.is_stop())
        .collect();
    let reopen = market_orders.last().unwrap();
    assert_eq!(reopen.symbol, symbol(OptionKind::Call, 60000));
    assert_eq!(reopen.side, straddle_core::Side::Buy);
    assert!(!reopen.reduce_only);

    let after = engine.position(&position.id).await.unwrap();
    assert_eq!(after.status, PositionStatus::Open);
    assert!(after.protection.is_placed());
    assert_eq!(paper.open_orders().len(), 2);
}

#[tokio::test]
async fn test_exit_with_failed_rollback_keeps_no_phantom_stops() {
    let paper = paper_venue(PaperGatewayConfig::default());
    // exit put and its rollback both rejected
    let gateway = RejectingGateway::new(paper.clone(), 5);
    let engine = StrategyEngine::new(gateway, EngineConfig::default());
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    let err = engine
        .close_position(&position.id, CloseReason::Manual)
        .await
        .unwrap_err();
    let EngineError::Execution(exec) = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(!exec.legs_unchanged());

    let after = engine.position(&position.id).await.unwrap();
    assert_ne!(after.status, PositionStatus::Closed);
    assert!(!after.protection.is_placed());
    assert!(after.protection.order_ids().is_empty());
}

#[tokio::test]
async fn test_stops_that_fail_to_cancel_are_kept() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let gateway = RejectingGateway::new(paper.clone(), 4).only(1).failing_cancels();
    let engine = StrategyEngine::new(gateway, EngineConfig::default());
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    engine
        .close_position(&position.id, CloseReason::Manual)
        .await
        .unwrap_err();

    // the original stops never left the venue and no duplicates were sent
    let after = engine.position(&position.id).await.unwrap();
    assert_eq!(after.protection, position.protection);
    assert_eq!(paper.open_orders().len(), 2);
    assert_eq!(engine.gateway().submitted.load(Ordering::SeqCst), 5);

    let closed = engine
        .close_position(&position.id, CloseReason::Manual)
        .await
        .unwrap();
    assert_eq!(closed.position.protection.order_ids().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_retries_after_clean_exit_failure() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let gateway = RejectingGateway::new(paper.clone(), 4).only(1);
    let engine = Arc::new(StrategyEngine::new(
        gateway,
        EngineConfig::default().with_poll_interval_secs(1),
    ));
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    paper.set_mark(&symbol(OptionKind::Call, 60000), dec!(600));
    paper.set_mark(&symbol(OptionKind::Put, 60000), dec!(400));

    let handle = engine.spawn_monitor(position.id.clone());
    tokio::time::timeout(Duration::from_secs(60), handle)
        .await
        .expect("monitor should close on a later tick")
        .unwrap();

    let closed = engine.position(&position.id).await.unwrap();
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.close_reason, Some(CloseReason::StopLoss));
}

#[tokio::test(start_paused = true)]
async fn test_monitor_stops_when_exit_changes_legs() {
    let paper = paper_venue(PaperGatewayConfig::default());
    let gateway = RejectingGateway::new(paper.clone(), 5);
    let engine = Arc::new(StrategyEngine::new(
        gateway,
        EngineConfig::default().with_poll_interval_secs(1),
    ));
    let position = engine
        .open_position(&straddle_params(Direction::Long))
        .await
        .unwrap();

    paper.set_mark(&symbol(OptionKind::Call, 60000), dec!(600));
    paper.set_mark(&symbol(OptionKind::Put, 60000), dec!(400));

    let handle = engine.spawn_monitor(position.id.clone());
    tokio::time::timeout(Duration::from_secs(60), handle)
        .await
        .expect("monitor should stop for manual reconciliation")
        .unwrap();

    let after = engine.position(&position.id).await.unwrap();
    assert_eq!(after.status, PositionStatus::Triggered);
    // exit call, rejected put, rejected rollback; nothing after that
    assert_eq!(engine.gateway().submitted.load(Ordering::SeqCst), 7);
}
