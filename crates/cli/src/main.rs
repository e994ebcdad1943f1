use clap::{Parser, Subcommand};

mod commands;

use commands::{OpenArgs, PreviewArgs, StrikesArgs};

#[derive(Parser)]
#[command(name = "straddle")]
#[command(about = "Straddle and strangle execution for Delta Exchange options", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    /// Config profile layered over the base file (config/Config.{profile}.toml)
    #[arg(long, global = true, env = "STRADDLE_PROFILE")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate target strikes from a spot price (no network access)
    Strikes(StrikesArgs),
    /// Preview a position: contracts, premiums, risk levels and margin
    Preview(PreviewArgs),
    /// Open a position and monitor it until it closes
    Open(OpenArgs),
}

fn load_config(cli: &Cli) -> anyhow::Result<straddle_core::AppConfig> {
    match &cli.profile {
        Some(profile) => straddle_core::ConfigLoader::load_with_profile(profile),
        None => straddle_core::ConfigLoader::load_from(&cli.config),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match &cli.command {
        Commands::Strikes(args) => commands::strikes::run(args)?,
        Commands::Preview(args) => {
            let config = load_config(&cli)?;
            commands::preview::run(args, &config).await?;
        }
        Commands::Open(args) => {
            let config = load_config(&cli)?;
            commands::open::run(args, &config).await?;
        }
    }

    Ok(())
}
