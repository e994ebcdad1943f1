//! Pure strike calculation from a given spot price.

use anyhow::Result;
use clap::Args;
use rust_decimal::Decimal;
use straddle_engine::{select_strikes, Moneyness, StrikeMethod};

/// Arguments for the strikes command.
#[derive(Args, Debug)]
pub struct StrikesArgs {
    /// Spot price of the underlying
    #[arg(long)]
    pub spot: Decimal,

    /// Strike method: percentage or atm-offset
    #[arg(long, default_value = "percentage")]
    pub method: String,

    /// Percent from spot, or number of strike increments from ATM
    #[arg(long)]
    pub value: Decimal,

    /// Moneyness for the percentage method: otm or itm
    #[arg(long, default_value = "otm")]
    pub moneyness: Moneyness,

    /// Listed strike spacing
    #[arg(long, default_value = "1000")]
    pub increment: Decimal,
}

/// Prints target strikes as JSON.
pub fn run(args: &StrikesArgs) -> Result<()> {
    let method = StrikeMethod::parse(&args.method, Some(args.moneyness), args.value)?;
    let target = select_strikes(args.spot, &method, args.increment)?;
    println!("{}", serde_json::to_string_pretty(&target)?);
    Ok(())
}
