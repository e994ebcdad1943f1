//! Read-only position preview.

use anyhow::Result;
use clap::Args;
use straddle_core::AppConfig;
use straddle_engine::{EngineConfig, StrategyEngine};

use super::strategy::{build_gateway, StrategyArgs, VenueArgs};

/// Arguments for the preview command.
#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub strategy: StrategyArgs,

    #[command(flatten)]
    pub venue: VenueArgs,
}

/// Prints the preview as JSON. Sends no orders.
pub async fn run(args: &PreviewArgs, config: &AppConfig) -> Result<()> {
    let params = args.strategy.to_params()?;
    let gateway = build_gateway(config, &args.venue)?;
    let engine = StrategyEngine::new(gateway, EngineConfig::from(config));

    let preview = engine.compute_preview(&params).await?;
    println!("{}", serde_json::to_string_pretty(&preview)?);

    if !preview.margin.is_sufficient() {
        tracing::warn!(
            required = %preview.margin.required(),
            available = %preview.margin.available(),
            "Margin is insufficient for this position"
        );
    }
    Ok(())
}
