//! Sensor bridge agent
//!
//! Accepts sensor observations over HTTP, validates and buffers them, and
//! ships batches to a remote time-series store.

use anyhow::{Context, Result};
use bridge_lib::{Bridge, HealthRegistry, StructuredLogger};
use sensor_bridge::{api, config::AgentConfig, events, transmitters};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sensor-bridge");

    let config = AgentConfig::load()?;
    info!(
        instance = %config.instance_name,
        api_port = config.api_port,
        transmitter = ?config.transmitter.kind,
        "Agent configured"
    );

    let (bridge_config, provider) = config
        .bridge
        .resolve()
        .context("Invalid bridge settings")?;
    let transmitter = transmitters::build(&config.transmitter, &config.instance_name)?;

    let bridge = Bridge::builder()
        .config(bridge_config)
        .provider(Arc::new(provider))
        .transmitter(transmitter)
        .health(HealthRegistry::new())
        .logger(StructuredLogger::new(&config.instance_name))
        .start()
        .await
        .context("Failed to start bridge")?;
    let bridge = Arc::new(bridge);

    let events_handle = tokio::spawn(events::log_flush_events(bridge.subscribe()));

    let app_state = Arc::new(api::AppState::new(Arc::clone(&bridge)));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let report = bridge.shutdown().await.context("Bridge shutdown failed")?;
    if report.timed_out {
        error!(
            points_lost = report.points_lost,
            "Final flush did not finish before the shutdown timeout"
        );
    }
    info!(
        points_flushed = report.points_flushed,
        points_lost = report.points_lost,
        points_sent_total = report.metrics.flush.points_sent,
        "Shutdown complete"
    );

    api_handle.abort();
    events_handle.abort();

    Ok(())
}
