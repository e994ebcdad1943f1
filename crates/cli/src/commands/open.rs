//! Open a position and monitor it until it closes.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use straddle_core::AppConfig;
use straddle_engine::{EngineConfig, EngineError, StrategyEngine};

use super::strategy::{build_gateway, StrategyArgs, VenueArgs};

/// Arguments for the open command.
#[derive(Args, Debug)]
pub struct OpenArgs {
    #[command(flatten)]
    pub strategy: StrategyArgs,

    #[command(flatten)]
    pub venue: VenueArgs,
}

/// Opens the position, then runs its monitor until the position closes or
/// Ctrl-C. Ctrl-C stops monitoring only; the position and its protective
/// stops stay live on the venue.
pub async fn run(args: &OpenArgs, config: &AppConfig) -> Result<()> {
    let params = args.strategy.to_params()?;
    let gateway = build_gateway(config, &args.venue)?;
    let engine = Arc::new(StrategyEngine::new(gateway, EngineConfig::from(config)));

    let position = match engine.open_position(&params).await {
        Ok(position) => position,
        Err(EngineError::Execution(err)) if err.is_ambiguous() => {
            tracing::error!(error = %err, "Venue state unknown, reconcile open orders manually");
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };
    println!("{}", serde_json::to_string_pretty(&position)?);

    if !position.protection.is_placed() {
        tracing::error!(
            position_id = %position.id,
            protection = ?position.protection,
            "Position is live without full stop protection"
        );
    }

    let mut monitor = engine.spawn_monitor(position.id.clone());
    tokio::select! {
        joined = &mut monitor => joined?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::warn!(position_id = %position.id, "Interrupted, position left open");
            engine.shutdown();
            monitor.await?;
        }
    }

    let latest = engine.position(&position.id).await?;
    println!("{}", serde_json::to_string_pretty(&latest)?);
    Ok(())
}
