//! Command line front end that finds the next collection day for every bin at an address.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use binnight_core::{
    config::{AppConfig, load_app_config_from_env},
    plugin::ProviderRegistry,
    service::BinNightService,
};
use binnight_provider_hrr as hrr;
use binnight_provider_maitland as maitland;
use binnight_provider_solo as solo;

#[derive(Debug, Parser)]
#[command(name = "binnight")]
#[command(about = "Bin collection days for Maitland and the lower Hunter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print merged address suggestions from every live provider.
    Search {
        /// Free-text street address.
        address: String,
    },
    /// Resolve an address and print the schedule for every bin.
    Lookup {
        /// Free-text street address.
        address: String,
        /// Index of the suggestion to use.
        #[arg(long, default_value_t = 0)]
        pick: usize,
    },
    /// List registered providers in priority order.
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_app_config_from_env()?;
    let service = build_service(&config)?;

    match cli.command {
        Commands::Search { address } => {
            let result = service.search_suggestions(&address).await?;
            print_json(&result)?;
        }
        Commands::Lookup { address, pick } => {
            let found = service.search_suggestions(&address).await?;
            let Some(selected) = found.suggestions.get(pick) else {
                bail!(
                    "no suggestion at index {pick}: {} found for {address:?}",
                    found.suggestions.len()
                );
            };
            info!(pick, address = %selected.display_text, "selected suggestion");
            let result = service.get_unified_schedule(selected).await?;
            print_json(&result)?;
        }
        Commands::Providers => print_json(&service.providers())?,
    }

    Ok(())
}

fn build_service(config: &AppConfig) -> Result<BinNightService> {
    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let plugins = vec![
        maitland::plugin(
            client.clone(),
            maitland::MaitlandConfig::from_settings(&config.providers),
        ),
        hrr::plugin(client, hrr::HrrConfig::from_settings(&config.providers)),
        solo::plugin(),
    ];
    let registry = Arc::new(ProviderRegistry::new(plugins));

    BinNightService::new(registry, config.aggregator.clone())
        .context("invalid rate limit configuration")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
