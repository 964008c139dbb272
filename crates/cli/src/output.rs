//! Output formatting utilities

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Parse a format name from the config file
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render rows as a rounded table
pub fn render_table<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(50));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "success" | "ready" | "armed" | "idle" => status.green().to_string(),
        "degraded" | "timeout" | "flushing" | "unknown" => status.yellow().to_string(),
        "unhealthy" | "failed" | "abandoned" | "stopped" | "not ready" => {
            status.red().to_string()
        }
        _ => status.to_string(),
    }
}

/// Format a percentage value already in `[0, 100]`
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| {
            dt.with_timezone(&Utc)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Format an optional timestamp, `-` when absent
pub fn format_optional_timestamp(timestamp: Option<&str>) -> String {
    timestamp
        .map(format_timestamp)
        .unwrap_or_else(|| "-".to_string())
}

/// Occupancy bar for a buffer fill level
pub fn fill_bar(used: usize, capacity: usize, width: usize) -> String {
    if capacity == 0 {
        return " ".repeat(width);
    }
    let filled = ((used.min(capacity) * width) + capacity - 1) / capacity;
    let bar = format!("{}{}", "#".repeat(filled), ".".repeat(width - filled));
    let ratio = used as f64 / capacity as f64;
    if ratio >= 0.9 {
        bar.red().to_string()
    } else if ratio >= 0.7 {
        bar.yellow().to_string()
    } else {
        bar.green().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp("2026-03-01T12:30:05.123Z"),
            "2026-03-01 12:30:05"
        );
        assert_eq!(format_timestamp("not-a-time"), "not-a-time");
        assert_eq!(format_optional_timestamp(None), "-");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(87.456), "87.5%");
    }

    #[test]
    fn test_fill_bar_width() {
        colored::control::set_override(false);
        assert_eq!(fill_bar(0, 100, 10), "..........");
        assert_eq!(fill_bar(50, 100, 10), "#####.....");
        assert_eq!(fill_bar(1, 100, 10), "#.........");
        assert_eq!(fill_bar(500, 100, 10), "##########");
    }

    #[test]
    fn test_output_format_from_name() {
        assert_eq!(OutputFormat::from_name("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_name("table"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_name("yaml"), None);
    }
}
