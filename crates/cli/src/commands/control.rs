//! Transmission history and manual flush

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, FlushResponse, TransmissionList};
use crate::output::{
    color_status, format_timestamp, print_json, print_success, print_warning, render_table,
    OutputFormat,
};

#[derive(Tabled)]
struct TransmissionRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Trigger")]
    trigger: String,
    #[tabled(rename = "Points")]
    points: usize,
    #[tabled(rename = "Series")]
    series: usize,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Recent transmissions, newest last
pub async fn show_transmissions(
    client: &ApiClient,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/v1/transmissions?limit={}", limit);
    let list: TransmissionList = client.get(&path).await?;

    if format == OutputFormat::Json {
        return print_json(&list);
    }

    if list.transmissions.is_empty() {
        print_warning("No transmissions recorded yet");
        return Ok(());
    }

    let rows: Vec<TransmissionRow> = list
        .transmissions
        .iter()
        .map(|t| TransmissionRow {
            timestamp: format_timestamp(&t.timestamp),
            status: color_status(&t.status),
            trigger: t.trigger.clone(),
            points: t.data_points,
            series: t.series_count,
            duration: format!("{}ms", t.duration_ms),
            error: t.error_message.clone().unwrap_or_default(),
        })
        .collect();
    println!("{}", render_table(rows));
    println!("\nTotal: {} transmissions", list.transmissions.len());

    if !list.recent_errors.is_empty() {
        println!();
        println!("{}", "Recent errors".bold());
        for entry in &list.recent_errors {
            println!(
                "  {} {}",
                format_timestamp(&entry.timestamp),
                entry.error_message.red()
            );
        }
    }

    Ok(())
}

/// Ask the agent to flush every tier now
pub async fn flush(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: FlushResponse = client.post("api/v1/flush").await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            if response.requested {
                print_success("Flush requested");
            } else {
                print_warning("Flush was not accepted");
            }
        }
    }

    Ok(())
}
