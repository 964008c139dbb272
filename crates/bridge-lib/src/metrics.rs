//! In-process pipeline counters
//!
//! [`MetricsAccumulator`] keeps lock-free totals that the HTTP API and the
//! shutdown report read back as a [`MetricsSnapshot`]. Every update is
//! mirrored into the Prometheus registry through [`BridgeMetrics`].

use crate::buffer::BufferSnapshot;
use crate::flush::FlushTrigger;
use crate::models::{Origin, Priority};
use crate::observability::BridgeMetrics;
use crate::validator::RejectionReason;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total: u64,
    pub valid: u64,
    pub converted_boolean: u64,
    /// Observations of disabled signals
    pub ignored: u64,
    pub rejected: BTreeMap<String, u64>,
    /// Percent of validated observations that passed
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlushStats {
    pub total_flushes: u64,
    pub failed_flushes: u64,
    pub flushes_by_trigger: BTreeMap<String, u64>,
    pub points_sent: u64,
    pub points_requeued: u64,
    pub points_evicted: u64,
    pub points_lost: u64,
    pub retries: u64,
    /// Failed sends that hit the send timeout
    pub send_timeouts: u64,
    pub consecutive_failures: u32,
    pub avg_buffer_size: f64,
    pub max_buffer_size: usize,
    pub last_flush_size: usize,
    pub last_flush_time: Option<DateTime<Utc>>,
    /// Points per second over the rate window
    pub arrival_rate: f64,
    pub current_interval_secs: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub validation: ValidationStats,
    pub enqueued: BTreeMap<String, u64>,
    pub flush: FlushStats,
}

/// Atomic f64 stored as bits
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

pub struct MetricsAccumulator {
    prometheus: BridgeMetrics,

    validated: AtomicU64,
    valid: AtomicU64,
    converted: AtomicU64,
    ignored: AtomicU64,
    rejected: [AtomicU64; 4],

    enqueued: [AtomicU64; 3],
    evicted: AtomicU64,

    flushes: [AtomicU64; 6],
    failed_flushes: AtomicU64,
    points_sent: AtomicU64,
    points_requeued: AtomicU64,
    points_lost: AtomicU64,
    retries: AtomicU64,
    send_timeouts: AtomicU64,
    consecutive_failures: AtomicU32,

    // Written by the flush task only
    flush_samples: AtomicU64,
    avg_buffer_size: AtomicF64,
    max_buffer_size: AtomicUsize,
    last_flush_size: AtomicUsize,
    /// Millis since epoch, 0 before the first flush
    last_flush_ms: AtomicI64,
    arrival_rate: AtomicF64,
    current_interval: AtomicF64,
}

impl Default for MetricsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self {
            prometheus: BridgeMetrics::new(),
            validated: AtomicU64::new(0),
            valid: AtomicU64::new(0),
            converted: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            rejected: Default::default(),
            enqueued: Default::default(),
            evicted: AtomicU64::new(0),
            flushes: Default::default(),
            failed_flushes: AtomicU64::new(0),
            points_sent: AtomicU64::new(0),
            points_requeued: AtomicU64::new(0),
            points_lost: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            send_timeouts: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            flush_samples: AtomicU64::new(0),
            avg_buffer_size: AtomicF64::default(),
            max_buffer_size: AtomicUsize::new(0),
            last_flush_size: AtomicUsize::new(0),
            last_flush_ms: AtomicI64::new(0),
            arrival_rate: AtomicF64::default(),
            current_interval: AtomicF64::default(),
        }
    }

    pub fn record_valid(&self, origin: Origin) {
        self.prometheus.inc_received();
        self.validated.fetch_add(1, Ordering::Relaxed);
        self.valid.fetch_add(1, Ordering::Relaxed);
        if origin == Origin::ConvertedBoolean {
            self.converted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejected(&self, reason: &RejectionReason) {
        self.prometheus.inc_received();
        self.prometheus.inc_rejected(reason.label());
        self.validated.fetch_add(1, Ordering::Relaxed);
        let idx = RejectionReason::LABELS
            .iter()
            .position(|l| *l == reason.label())
            .unwrap_or(0);
        self.rejected[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.prometheus.inc_received();
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aggregation(&self, emitted: bool) {
        self.prometheus.observe_aggregation(emitted);
    }

    pub fn record_window_closes(&self, n: usize) {
        self.prometheus.add_aggregation_emitted(n as u64);
    }

    pub fn record_enqueued(&self, priority: Priority, evicted: usize) {
        self.prometheus.inc_enqueued(priority.as_str());
        self.enqueued[priority.index()].fetch_add(1, Ordering::Relaxed);
        if evicted > 0 {
            self.prometheus.add_evicted(evicted as u64);
            self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            self.points_lost.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    pub fn record_buffer(&self, snapshot: &BufferSnapshot) {
        self.prometheus
            .set_buffer_points(snapshot.high, snapshot.medium, snapshot.low);
    }

    /// Account for a flush cycle starting with `buffer_size` points buffered
    pub fn record_flush_start(&self, trigger: FlushTrigger, buffer_size: usize) {
        self.flushes[trigger.index()].fetch_add(1, Ordering::Relaxed);

        let n = self.flush_samples.fetch_add(1, Ordering::Relaxed) + 1;
        let avg = self.avg_buffer_size.load();
        self.avg_buffer_size
            .store(avg + (buffer_size as f64 - avg) / n as f64);
        self.max_buffer_size.fetch_max(buffer_size, Ordering::Relaxed);
    }

    pub fn record_batch_sent(&self, points: usize, duration_secs: f64) {
        self.prometheus.observe_send(duration_secs, points as u64);
        self.points_sent.fetch_add(points as u64, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_batch_failed(
        &self,
        requeued: usize,
        evicted: usize,
        duration_secs: f64,
        timed_out: bool,
    ) {
        self.prometheus.observe_send(duration_secs, 0);
        if timed_out {
            self.prometheus.inc_send_timeout();
            self.send_timeouts.fetch_add(1, Ordering::Relaxed);
        }
        self.prometheus.add_requeued(requeued as u64);
        self.points_requeued
            .fetch_add(requeued as u64, Ordering::Relaxed);
        self.retries.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        if evicted > 0 {
            self.prometheus.add_evicted(evicted as u64);
            self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            self.points_lost.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    pub fn record_flush_end(&self, trigger: FlushTrigger, points_sent: usize, success: bool) {
        self.prometheus
            .inc_flush(trigger.as_str(), if success { "success" } else { "failure" });
        if !success {
            self.failed_flushes.fetch_add(1, Ordering::Relaxed);
        }
        self.last_flush_size.store(points_sent, Ordering::Relaxed);
        self.last_flush_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_lost(&self, n: usize) {
        self.prometheus.add_lost(n as u64);
        self.points_lost.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_rate(&self, rate: f64, interval_secs: f64) {
        self.prometheus.set_flush_interval(interval_secs);
        self.arrival_rate.store(rate);
        self.current_interval.store(interval_secs);
    }

    pub fn points_lost(&self) -> u64 {
        self.points_lost.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let validated = self.validated.load(Ordering::Relaxed);
        let valid = self.valid.load(Ordering::Relaxed);
        let rejected = RejectionReason::LABELS
            .iter()
            .zip(self.rejected.iter())
            .map(|(label, n)| (label.to_string(), n.load(Ordering::Relaxed)))
            .collect();

        let enqueued = Priority::ALL
            .iter()
            .map(|p| (p.to_string(), self.enqueued[p.index()].load(Ordering::Relaxed)))
            .collect();

        let flushes_by_trigger: BTreeMap<String, u64> = FlushTrigger::ALL
            .iter()
            .map(|t| (t.to_string(), self.flushes[t.index()].load(Ordering::Relaxed)))
            .filter(|(_, n)| *n > 0)
            .collect();

        let last_ms = self.last_flush_ms.load(Ordering::Relaxed);
        let last_flush_time = if last_ms == 0 {
            None
        } else {
            Utc.timestamp_millis_opt(last_ms).single()
        };

        MetricsSnapshot {
            validation: ValidationStats {
                total: validated,
                valid,
                converted_boolean: self.converted.load(Ordering::Relaxed),
                ignored: self.ignored.load(Ordering::Relaxed),
                rejected,
                success_rate: if validated == 0 {
                    0.0
                } else {
                    (valid as f64 / validated as f64 * 10_000.0).round() / 100.0
                },
            },
            enqueued,
            flush: FlushStats {
                total_flushes: flushes_by_trigger.values().sum(),
                failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
                flushes_by_trigger,
                points_sent: self.points_sent.load(Ordering::Relaxed),
                points_requeued: self.points_requeued.load(Ordering::Relaxed),
                points_evicted: self.evicted.load(Ordering::Relaxed),
                points_lost: self.points_lost.load(Ordering::Relaxed),
                retries: self.retries.load(Ordering::Relaxed),
                send_timeouts: self.send_timeouts.load(Ordering::Relaxed),
                consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
                avg_buffer_size: self.avg_buffer_size.load(),
                max_buffer_size: self.max_buffer_size.load(Ordering::Relaxed),
                last_flush_size: self.last_flush_size.load(Ordering::Relaxed),
                last_flush_time,
                arrival_rate: self.arrival_rate.load(),
                current_interval_secs: self.current_interval.load(),
            },
        }
    }
}
