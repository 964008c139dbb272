//! HTTP API for health checks, Prometheus metrics and bridge control

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bridge_lib::{
    status::{ErrorEntry, HealthSummary, TransmissionStatistics},
    AggregationStats, Bridge, BufferSnapshot, IngestOutcome, MetricsSnapshot,
    RawObservation, TransmissionRecord,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

/// Default and maximum number of records returned by `/api/v1/transmissions`
const DEFAULT_TRANSMISSION_LIMIT: usize = 20;
const MAX_TRANSMISSION_LIMIT: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
}

impl AppState {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}

/// A single observation or an array of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ObservationBatch {
    Many(Vec<RawObservation>),
    One(RawObservation),
}

impl ObservationBatch {
    fn into_vec(self) -> Vec<RawObservation> {
        match self {
            ObservationBatch::Many(v) => v,
            ObservationBatch::One(o) => vec![o],
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IngestSummary {
    pub received: usize,
    /// Buffered or absorbed by aggregation
    pub accepted: usize,
    pub rejected: usize,
    pub buffered: usize,
    pub aggregated: usize,
    pub ignored: usize,
    /// Arrived after shutdown began
    pub closed: usize,
    pub rejections: BTreeMap<String, usize>,
}

impl IngestSummary {
    fn record(&mut self, outcome: &IngestOutcome) {
        self.received += 1;
        match outcome {
            IngestOutcome::Buffered(_) => {
                self.accepted += 1;
                self.buffered += 1;
            }
            IngestOutcome::Aggregated => {
                self.accepted += 1;
                self.aggregated += 1;
            }
            IngestOutcome::Rejected(reason) => {
                self.rejected += 1;
                *self.rejections.entry(reason.label().to_string()).or_default() += 1;
            }
            IngestOutcome::Ignored => self.ignored += 1,
            IngestOutcome::Closed => self.closed += 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlushResponse {
    pub requested: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BufferResponse {
    #[serde(flatten)]
    pub snapshot: BufferSnapshot,
    pub hard_cap: usize,
    pub max_batch_size: usize,
    pub strategy: String,
    pub scheduler_state: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub metrics: MetricsSnapshot,
    pub transmissions: TransmissionStatistics,
    pub transmission_health: HealthSummary,
}

#[derive(Debug, Deserialize)]
pub struct TransmissionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransmissionsResponse {
    pub transmissions: Vec<TransmissionRecord>,
    pub recent_errors: Vec<ErrorEntry>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.bridge.health().health().await;

    // Degraded is still operational
    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.bridge.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn ingest_observations(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<ObservationBatch>,
) -> impl IntoResponse {
    let mut summary = IngestSummary::default();
    for obs in batch.into_vec() {
        let outcome = state.bridge.ingest(obs);
        summary.record(&outcome);
    }

    let status_code = if summary.closed > 0 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(summary))
}

async fn flush(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let requested = state.bridge.flush_now();
    if requested {
        info!(source = "api", "Manual flush requested");
        (StatusCode::ACCEPTED, Json(FlushResponse { requested }))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(FlushResponse { requested }))
    }
}

async fn buffer(State(state): State<Arc<AppState>>) -> Json<BufferResponse> {
    let flush = &state.bridge.config().flush;
    Json(BufferResponse {
        snapshot: state.bridge.buffer_snapshot(),
        hard_cap: flush.hard_cap,
        max_batch_size: flush.max_batch_size,
        strategy: flush.strategy.to_string(),
        scheduler_state: state.bridge.state().as_str().to_string(),
    })
}

async fn aggregation(State(state): State<Arc<AppState>>) -> Json<AggregationStats> {
    Json(state.bridge.aggregation_stats())
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let tracker = state.bridge.transmissions();
    Json(StatsResponse {
        metrics: state.bridge.metrics(),
        transmissions: tracker.statistics(),
        transmission_health: tracker.health_summary(),
    })
}

async fn transmissions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransmissionsQuery>,
) -> Json<TransmissionsResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSMISSION_LIMIT)
        .min(MAX_TRANSMISSION_LIMIT);
    let tracker = state.bridge.transmissions();
    Json(TransmissionsResponse {
        transmissions: tracker.recent(limit),
        recent_errors: tracker.recent_errors(),
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/observations", post(ingest_observations))
        .route("/api/v1/flush", post(flush))
        .route("/api/v1/buffer", get(buffer))
        .route("/api/v1/aggregation", get(aggregation))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/transmissions", get(transmissions))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
