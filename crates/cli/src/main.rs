//! bridgectl
//!
//! Inspect and control a running sensor bridge agent over its HTTP API.

use anyhow::Result;
use bridgectl::client::ApiClient;
use bridgectl::commands::{control, stats, status};
use bridgectl::config::Config;
use bridgectl::output::OutputFormat;
use clap::{Parser, Subcommand};

/// Sensor bridge CLI
#[derive(Parser)]
#[command(name = "bridgectl")]
#[command(author, version, about = "CLI for the sensor bridge agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via BRIDGECTL_API_URL env var)
    #[arg(long, env = "BRIDGECTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show overall health, scheduler state and buffer occupancy
    Status,

    /// Show validation, flush and transmission statistics
    Stats,

    /// Show aggregation counters
    Aggregation,

    /// Show recent transmissions
    Transmissions {
        /// Number of records to show
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },

    /// Flush every buffered point now
    Flush,

    /// Show component health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    let api_url = config.resolve_api_url(cli.api_url.as_deref());
    let format: OutputFormat = config.resolve_format(cli.format);

    let client = ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Status => status::show_status(&client, format).await?,
        Commands::Stats => stats::show_stats(&client, format).await?,
        Commands::Aggregation => stats::show_aggregation(&client, format).await?,
        Commands::Transmissions { limit } => {
            control::show_transmissions(&client, limit, format).await?
        }
        Commands::Flush => control::flush(&client, format).await?,
        Commands::Health => status::show_health(&client, format).await?,
    }

    Ok(())
}
