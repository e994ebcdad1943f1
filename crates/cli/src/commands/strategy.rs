//! Strategy arguments and gateway construction shared by `preview` and `open`.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use rust_decimal::Decimal;
use straddle_core::{AppConfig, ExpiryClass, MarketGateway, RetryingGateway};
use straddle_delta::{DeltaClient, DeltaClientConfig, PaperGateway, PaperGatewayConfig};
use straddle_engine::{
    Direction, Moneyness, PriceRule, PriceUnit, StrategyParams, StrikeMethod,
};

/// Parameters of a straddle or strangle.
#[derive(Args, Debug)]
pub struct StrategyArgs {
    /// Underlying asset (BTC, ETH)
    #[arg(long, default_value = "BTC")]
    pub underlying: String,

    /// Expiry class: daily, weekly or monthly
    #[arg(long, default_value = "weekly")]
    pub expiry: ExpiryClass,

    /// Strike method: percentage or atm-offset
    #[arg(long, default_value = "atm-offset")]
    pub method: String,

    /// Percent from spot, or number of strike increments from ATM
    #[arg(long)]
    pub value: Decimal,

    /// Moneyness for the percentage method: otm or itm
    #[arg(long, default_value = "otm")]
    pub moneyness: Moneyness,

    /// Lots per leg
    #[arg(long, default_value_t = 1)]
    pub lot_size: u32,

    /// long buys both legs, short sells both
    #[arg(long, default_value = "long")]
    pub direction: Direction,

    /// Unit of the stop trigger: percentage, absolute or multiple
    #[arg(long, default_value = "percentage")]
    pub sl_trigger_unit: PriceUnit,

    /// Stop trigger value
    #[arg(long)]
    pub sl_trigger: Decimal,

    /// Unit of the stop limit: percentage, absolute or multiple
    #[arg(long, default_value = "percentage")]
    pub sl_limit_unit: PriceUnit,

    /// Stop limit value
    #[arg(long)]
    pub sl_limit: Decimal,

    /// Unit of the take-profit price
    #[arg(long, default_value = "percentage")]
    pub target_unit: PriceUnit,

    /// Take-profit value
    #[arg(long)]
    pub target: Option<Decimal>,

    /// Close when the combined premium loss reaches this percent
    #[arg(long)]
    pub stop_loss_pct: Decimal,

    /// Close when the combined premium gain reaches this percent
    #[arg(long)]
    pub target_pct: Option<Decimal>,
}

impl StrategyArgs {
    /// Builds engine parameters. Range checks happen in the engine.
    pub fn to_params(&self) -> Result<StrategyParams> {
        let method = StrikeMethod::parse(&self.method, Some(self.moneyness), self.value)?;
        Ok(StrategyParams {
            underlying: self.underlying.to_ascii_uppercase(),
            expiry: self.expiry,
            method,
            lot_size: self.lot_size,
            direction: self.direction,
            stop_trigger: PriceRule::new(self.sl_trigger_unit, self.sl_trigger),
            stop_limit: PriceRule::new(self.sl_limit_unit, self.sl_limit),
            target: self.target.map(|value| PriceRule::new(self.target_unit, value)),
            stop_loss_pct: self.stop_loss_pct,
            target_pct: self.target_pct,
        })
    }
}

/// Venue selection.
#[derive(Args, Debug)]
pub struct VenueArgs {
    /// Trade against the in-memory paper venue, priced from live market data
    #[arg(long)]
    pub paper: bool,

    /// Starting paper balance in the settlement asset
    #[arg(long, default_value = "10000")]
    pub paper_balance: Decimal,
}

/// Builds the gateway the engine trades through.
///
/// Live trading needs credentials in the environment variables named by
/// `delta.api_key_env` and `delta.api_secret_env`. Paper trading reads
/// market data through the unauthenticated endpoints only.
pub fn build_gateway(config: &AppConfig, venue: &VenueArgs) -> Result<Arc<dyn MarketGateway>> {
    let client_config = DeltaClientConfig::from(&config.delta);

    if venue.paper {
        let market_data = RetryingGateway::new(
            DeltaClient::public(client_config)?,
            config.retry.clone(),
        );
        let paper = PaperGateway::new(
            PaperGatewayConfig::with_balance(venue.paper_balance)
                .settlement_asset(config.delta.settlement_asset.clone()),
        )
        .with_market_data(Arc::new(market_data));
        tracing::info!(balance = %venue.paper_balance, "Using paper venue");
        return Ok(Arc::new(paper));
    }

    let client = DeltaClient::new(client_config)?;
    tracing::info!(base_url = %client.base_url(), "Using Delta Exchange");
    Ok(Arc::new(RetryingGateway::new(client, config.retry.clone())))
}
