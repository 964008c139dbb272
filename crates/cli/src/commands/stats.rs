//! Pipeline statistics commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{AggregationStats, ApiClient, StatsResponse};
use crate::output::{
    color_status, format_optional_timestamp, format_percent, print_heading, print_info,
    print_json, render_table, OutputFormat,
};

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Count")]
    count: u64,
}

fn count_rows<'a>(counts: impl IntoIterator<Item = (&'a String, &'a u64)>) -> Vec<CountRow> {
    counts
        .into_iter()
        .map(|(name, count)| CountRow {
            name: name.clone(),
            count: *count,
        })
        .collect()
}

/// Validation, buffering, flush and transmission statistics
pub async fn show_stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats: StatsResponse = client.get("api/v1/stats").await?;

    if format == OutputFormat::Json {
        return print_json(&stats);
    }

    let validation = &stats.metrics.validation;
    print_heading("Validation");
    println!("Observations:       {}", validation.total);
    println!("Valid:              {}", validation.valid);
    println!("Converted boolean:  {}", validation.converted_boolean);
    println!("Ignored (disabled): {}", validation.ignored);
    println!("Success rate:       {}", format_percent(validation.success_rate));
    let rejected: Vec<_> = validation.rejected.iter().filter(|(_, n)| **n > 0).collect();
    if !rejected.is_empty() {
        println!("{}", render_table(count_rows(rejected)));
    }
    println!();

    if !stats.metrics.enqueued.is_empty() {
        println!("{}", "Enqueued by priority".bold());
        println!("{}", render_table(count_rows(&stats.metrics.enqueued)));
        println!();
    }

    let flush = &stats.metrics.flush;
    print_heading("Flushing");
    println!("Flushes:            {} ({} failed)", flush.total_flushes, flush.failed_flushes);
    println!("Points sent:        {}", flush.points_sent);
    println!("Points requeued:    {}", flush.points_requeued);
    println!("Points evicted:     {}", flush.points_evicted);
    println!("Points lost:        {}", flush.points_lost);
    println!("Send timeouts:      {}", flush.send_timeouts);
    println!("Avg buffer size:    {:.1}", flush.avg_buffer_size);
    println!("Max buffer size:    {}", flush.max_buffer_size);
    println!("Last flush:         {} points at {}", flush.last_flush_size, format_optional_timestamp(flush.last_flush_time.as_deref()));
    println!("Arrival rate:       {:.3} points/s", flush.arrival_rate);
    println!("Current interval:   {:.0}s", flush.current_interval_secs);
    if !flush.flushes_by_trigger.is_empty() {
        println!("{}", render_table(count_rows(&flush.flushes_by_trigger)));
    }
    println!();

    let tx = &stats.transmissions;
    let health = &stats.transmission_health;
    print_heading("Transmissions");
    println!("Health:               {}", color_status(&health.health_status));
    println!("Total:                {}", tx.total_transmissions);
    println!("Succeeded:            {}", tx.successful_transmissions);
    println!(
        "Failed:               {} ({} timed out)",
        tx.failed_transmissions, tx.timed_out_transmissions
    );
    println!("Success rate:         {}", format_percent(tx.success_rate));
    println!("Consecutive failures: {}", tx.consecutive_failures);
    println!("Avg duration:         {:.1}ms", tx.average_duration_ms);
    println!("Last success:         {}", format_optional_timestamp(tx.last_success_time.as_deref()));
    if let Some(error) = &health.last_error {
        println!("Last error:           {}", error.red());
    }
    for recommendation in &health.recommendations {
        print_info(recommendation);
    }

    Ok(())
}

/// Aggregation counters
pub async fn show_aggregation(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats: AggregationStats = client.get("api/v1/aggregation").await?;

    if format == OutputFormat::Json {
        return print_json(&stats);
    }

    print_heading("Aggregation");
    println!("Points in:        {}", stats.total_in);
    println!("Points emitted:   {}", stats.total_emitted);
    println!("Reduction:        {}", format_percent(stats.reduction_ratio * 100.0));
    println!("Open windows:     {}", stats.open_windows);
    println!("Buffered samples: {}", stats.buffered_samples);

    let methods: Vec<_> = stats
        .per_method_distribution
        .iter()
        .filter(|(_, n)| **n > 0)
        .collect();
    if !methods.is_empty() {
        println!();
        println!("{}", render_table(count_rows(methods)));
    }

    Ok(())
}
