//! Status and health commands

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, BufferStatus, HealthResponse, ReadinessResponse};
use crate::output::{
    color_status, fill_bar, print_heading, print_json, print_warning, render_table, OutputFormat,
};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct StatusView {
    health: HealthResponse,
    buffer: BufferStatus,
}

#[derive(Serialize)]
struct HealthView {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

/// Overall health plus buffer occupancy and scheduler state
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (bool, HealthResponse) = client.probe("healthz").await?;
    let buffer: BufferStatus = client.get("api/v1/buffer").await?;

    match format {
        OutputFormat::Json => print_json(&StatusView { health, buffer })?,
        OutputFormat::Table => {
            print_heading("Sensor Bridge Status");
            println!("Agent:      {}", client.base_url().as_str().cyan());
            println!("Health:     {}", color_status(&health.status));
            println!("Scheduler:  {}", color_status(&buffer.scheduler_state));
            println!("Strategy:   {}", buffer.strategy);
            println!("Batch size: {}", buffer.max_batch_size);
            println!();

            println!("{}", "Buffer".bold());
            println!("{}", "-".repeat(50));
            println!(
                "[{}] {}/{}",
                fill_bar(buffer.total, buffer.hard_cap, 30),
                buffer.total,
                buffer.hard_cap
            );
            println!("  high:   {}", buffer.high);
            println!("  medium: {}", buffer.medium);
            println!("  low:    {}", buffer.low);
        }
    }

    Ok(())
}

/// Component health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (bool, HealthResponse) = client.probe("healthz").await?;
    let (_, readiness): (bool, ReadinessResponse) = client.probe("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&HealthView { health, readiness })?,
        OutputFormat::Table => {
            print_heading("Health");
            println!("Overall: {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Ready:   {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                println!("Reason:  {}", reason);
            }
            println!();

            if health.components.is_empty() {
                print_warning("No components registered");
                return Ok(());
            }

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            println!("{}", render_table(rows));
        }
    }

    Ok(())
}
