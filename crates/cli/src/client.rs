//! API client for the sensor bridge agent

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the agent's HTTP API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// GET a probe endpoint, which answers 503 with a body when not healthy
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<(bool, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.json().await.context("Failed to parse response")?;
            return Ok((false, body));
        }
        Ok((true, Self::decode(response).await?))
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferStatus {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
    pub hard_cap: usize,
    pub max_batch_size: usize,
    pub strategy: String,
    pub scheduler_state: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationStats {
    pub total_in: u64,
    pub total_emitted: u64,
    pub reduction_ratio: f64,
    pub per_method_distribution: BTreeMap<String, u64>,
    pub open_windows: usize,
    pub buffered_samples: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationStats {
    pub total: u64,
    pub valid: u64,
    pub converted_boolean: u64,
    pub ignored: u64,
    pub rejected: BTreeMap<String, u64>,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushStats {
    pub total_flushes: u64,
    pub failed_flushes: u64,
    pub flushes_by_trigger: BTreeMap<String, u64>,
    pub points_sent: u64,
    pub points_requeued: u64,
    pub points_evicted: u64,
    pub points_lost: u64,
    pub send_timeouts: u64,
    pub consecutive_failures: u32,
    pub avg_buffer_size: f64,
    pub max_buffer_size: usize,
    pub last_flush_size: usize,
    pub last_flush_time: Option<String>,
    pub arrival_rate: f64,
    pub current_interval_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    pub validation: ValidationStats,
    pub enqueued: BTreeMap<String, u64>,
    pub flush: FlushStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionStatistics {
    pub total_transmissions: u64,
    pub successful_transmissions: u64,
    pub failed_transmissions: u64,
    pub timed_out_transmissions: u64,
    pub success_rate: f64,
    pub total_data_points_sent: u64,
    pub average_data_points: f64,
    pub average_duration_ms: f64,
    pub consecutive_failures: u32,
    pub last_success_time: Option<String>,
    pub last_failure_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionHealth {
    pub health_status: String,
    pub consecutive_failures: u32,
    pub recent_errors_count: usize,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub metrics: MetricsSnapshot,
    pub transmissions: TransmissionStatistics,
    pub transmission_health: TransmissionHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionRecord {
    pub timestamp: String,
    pub status: String,
    pub data_points: usize,
    pub series_count: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub trigger: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionList {
    pub transmissions: Vec<TransmissionRecord>,
    #[serde(default)]
    pub recent_errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushResponse {
    pub requested: bool,
}
