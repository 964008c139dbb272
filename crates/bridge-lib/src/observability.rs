//! Observability for the sensor bridge
//!
//! Provides:
//! - Prometheus metrics (rejections, buffer occupancy, flushes, send latency)
//! - Structured JSON logging of lifecycle and flush events

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Gauge, Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Send latency buckets (in seconds)
const SEND_LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

static GLOBAL_METRICS: OnceLock<BridgeMetricsInner> = OnceLock::new();

struct BridgeMetricsInner {
    observations_received: IntCounter,
    observations_rejected: IntCounterVec,
    points_enqueued: IntCounterVec,
    points_evicted: IntCounter,
    buffer_points: IntGaugeVec,
    flushes: IntCounterVec,
    points_sent: IntCounter,
    points_requeued: IntCounter,
    points_lost: IntCounter,
    send_timeouts: IntCounter,
    send_latency_seconds: Histogram,
    aggregation_in: IntCounter,
    aggregation_emitted: IntCounter,
    flush_interval_seconds: Gauge,
}

impl BridgeMetricsInner {
    fn new() -> Self {
        Self {
            observations_received: register_int_counter!(
                "sensor_bridge_observations_received_total",
                "Raw observations received from event sources"
            )
            .expect("Failed to register observations_received"),

            observations_rejected: register_int_counter_vec!(
                "sensor_bridge_observations_rejected_total",
                "Observations rejected by the validator",
                &["reason"]
            )
            .expect("Failed to register observations_rejected"),

            points_enqueued: register_int_counter_vec!(
                "sensor_bridge_points_enqueued_total",
                "Points accepted into the buffer",
                &["priority"]
            )
            .expect("Failed to register points_enqueued"),

            points_evicted: register_int_counter!(
                "sensor_bridge_points_evicted_total",
                "Points evicted because the buffer was at its hard cap"
            )
            .expect("Failed to register points_evicted"),

            buffer_points: register_int_gauge_vec!(
                "sensor_bridge_buffer_points",
                "Points currently buffered",
                &["priority"]
            )
            .expect("Failed to register buffer_points"),

            flushes: register_int_counter_vec!(
                "sensor_bridge_flushes_total",
                "Flush cycles by trigger and outcome",
                &["trigger", "outcome"]
            )
            .expect("Failed to register flushes"),

            points_sent: register_int_counter!(
                "sensor_bridge_points_sent_total",
                "Points acknowledged by the transmitter"
            )
            .expect("Failed to register points_sent"),

            points_requeued: register_int_counter!(
                "sensor_bridge_points_requeued_total",
                "Points returned to the buffer after a failed send"
            )
            .expect("Failed to register points_requeued"),

            points_lost: register_int_counter!(
                "sensor_bridge_points_lost_total",
                "Points discarded at shutdown or by eviction"
            )
            .expect("Failed to register points_lost"),

            send_timeouts: register_int_counter!(
                "sensor_bridge_send_timeouts_total",
                "Sends abandoned after the send timeout"
            )
            .expect("Failed to register send_timeouts"),

            send_latency_seconds: register_histogram!(
                "sensor_bridge_send_latency_seconds",
                "Duration of a single transmitter send",
                SEND_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register send_latency_seconds"),

            aggregation_in: register_int_counter!(
                "sensor_bridge_aggregation_points_in_total",
                "Points fed to the aggregator"
            )
            .expect("Failed to register aggregation_in"),

            aggregation_emitted: register_int_counter!(
                "sensor_bridge_aggregation_points_emitted_total",
                "Points emitted by the aggregator"
            )
            .expect("Failed to register aggregation_emitted"),

            flush_interval_seconds: register_gauge!(
                "sensor_bridge_flush_interval_seconds",
                "Current time-based flush interval"
            )
            .expect("Failed to register flush_interval_seconds"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics.
///
/// Cloning is free; every handle writes to the same registry entries.
#[derive(Clone)]
pub struct BridgeMetrics {
    _private: (),
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(BridgeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &BridgeMetricsInner {
        GLOBAL_METRICS.get_or_init(BridgeMetricsInner::new)
    }

    pub fn inc_received(&self) {
        self.inner().observations_received.inc();
    }

    pub fn inc_rejected(&self, reason: &str) {
        self.inner()
            .observations_rejected
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_enqueued(&self, priority: &str) {
        self.inner().points_enqueued.with_label_values(&[priority]).inc();
    }

    pub fn add_evicted(&self, n: u64) {
        self.inner().points_evicted.inc_by(n);
        self.inner().points_lost.inc_by(n);
    }

    pub fn set_buffer_points(&self, high: usize, medium: usize, low: usize) {
        let gauge = &self.inner().buffer_points;
        gauge.with_label_values(&["high"]).set(high as i64);
        gauge.with_label_values(&["medium"]).set(medium as i64);
        gauge.with_label_values(&["low"]).set(low as i64);
    }

    pub fn inc_flush(&self, trigger: &str, outcome: &str) {
        self.inner()
            .flushes
            .with_label_values(&[trigger, outcome])
            .inc();
    }

    pub fn observe_send(&self, duration_secs: f64, sent: u64) {
        self.inner().send_latency_seconds.observe(duration_secs);
        self.inner().points_sent.inc_by(sent);
    }

    pub fn add_requeued(&self, n: u64) {
        self.inner().points_requeued.inc_by(n);
    }

    pub fn add_lost(&self, n: u64) {
        self.inner().points_lost.inc_by(n);
    }

    pub fn inc_send_timeout(&self) {
        self.inner().send_timeouts.inc();
    }

    pub fn observe_aggregation(&self, emitted: bool) {
        self.inner().aggregation_in.inc();
        if emitted {
            self.inner().aggregation_emitted.inc();
        }
    }

    /// Window closes emit without a matching input
    pub fn add_aggregation_emitted(&self, n: u64) {
        self.inner().aggregation_emitted.inc_by(n);
    }

    pub fn set_flush_interval(&self, secs: f64) {
        self.inner().flush_interval_seconds.set(secs);
    }
}

/// Named lifecycle events with a consistent field layout
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, version: &str, strategy: &str, transmitter: &str) {
        info!(
            event = "bridge_started",
            instance = %self.instance,
            version = %version,
            strategy = %strategy,
            transmitter = %transmitter,
            "Sensor bridge started"
        );
    }

    pub fn log_shutdown(&self, reason: &str, lost: usize) {
        info!(
            event = "bridge_shutdown",
            instance = %self.instance,
            reason = %reason,
            points_lost = lost,
            "Sensor bridge shutting down"
        );
    }

    pub fn log_rejection(&self, signal_id: &str, reason: &str, detail: &str) {
        debug!(
            event = "observation_rejected",
            instance = %self.instance,
            signal_id = %signal_id,
            reason = %reason,
            detail = %detail,
            "Observation rejected"
        );
    }

    pub fn log_flush(&self, trigger: &str, points: usize, batches: usize, duration_ms: u64) {
        info!(
            event = "flush_completed",
            instance = %self.instance,
            trigger = %trigger,
            points = points,
            batches = batches,
            duration_ms = duration_ms,
            "Flush completed"
        );
    }

    pub fn log_flush_failed(&self, trigger: &str, requeued: usize, error: &str) {
        warn!(
            event = "flush_failed",
            instance = %self.instance,
            trigger = %trigger,
            requeued = requeued,
            error = %error,
            "Flush failed, points returned to buffer"
        );
    }

    pub fn log_points_lost(&self, count: usize, cause: &str) {
        warn!(
            event = "points_lost",
            instance = %self.instance,
            count = count,
            cause = %cause,
            "Points discarded"
        );
    }
}
