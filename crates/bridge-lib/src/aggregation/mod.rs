//! Per-signal data aggregation
//!
//! Reduces high-frequency signals before they reach the buffer:
//! - `none` passes every point through
//! - time-windowed statistics (`average`, `median`, `min`, `max`, `sum`,
//!   `first`, `last`, `count`) emit one point per closed window
//! - `change_only` emits only significant changes
//!
//! Window state lives in a [`DashMap`] keyed by signal id, so updates to one
//! signal are serialized while distinct signals proceed independently.

mod method;
mod window;

pub use method::{AggregationConfig, AggregationMethod};
pub use window::AggregationWindow;

use crate::models::NormalizedPoint;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Aggregation counters for external reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationStats {
    pub total_in: u64,
    pub total_emitted: u64,
    /// `1 - emitted / in`, in `[0, 1]`
    pub reduction_ratio: f64,
    pub per_method_distribution: BTreeMap<String, u64>,
    pub open_windows: usize,
    pub buffered_samples: u64,
}

/// Aggregator over all signals
pub struct Aggregator {
    windows: DashMap<String, AggregationWindow>,
    total_in: AtomicU64,
    total_emitted: AtomicU64,
    per_method: [AtomicU64; 10],
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            total_in: AtomicU64::new(0),
            total_emitted: AtomicU64::new(0),
            per_method: Default::default(),
        }
    }

    /// Feed one validated point. Returns a point to enqueue, if any.
    pub fn ingest(&self, point: NormalizedPoint, config: &AggregationConfig) -> Option<NormalizedPoint> {
        self.total_in.fetch_add(1, Ordering::Relaxed);
        self.per_method[config.method.index()].fetch_add(1, Ordering::Relaxed);

        let emitted = match config.method {
            AggregationMethod::None => Some(point),
            AggregationMethod::ChangeOnly => self
                .windows
                .entry(point.signal_id.clone())
                .or_default()
                .change_only(point, config),
            _ => self
                .windows
                .entry(point.signal_id.clone())
                .or_default()
                .push(point, config),
        };

        if let Some(p) = &emitted {
            self.total_emitted.fetch_add(1, Ordering::Relaxed);
            if p.origin == crate::models::Origin::Aggregated {
                debug!(
                    signal_id = %p.signal_id,
                    value = p.value,
                    "Aggregation window closed"
                );
            }
        }
        emitted
    }

    /// Close every window whose length has elapsed at `now`
    pub fn close_expired(&self, now: DateTime<Utc>) -> Vec<NormalizedPoint> {
        let mut out = Vec::new();
        for mut entry in self.windows.iter_mut() {
            if entry.is_expired(now) {
                if let Some(p) = entry.close_at_deadline() {
                    out.push(p);
                }
            }
        }
        self.total_emitted
            .fetch_add(out.len() as u64, Ordering::Relaxed);
        out
    }

    /// Close every open window regardless of age
    pub fn drain_all(&self) -> Vec<NormalizedPoint> {
        let mut out = Vec::new();
        for mut entry in self.windows.iter_mut() {
            if let Some(p) = entry.close_now() {
                out.push(p);
            }
        }
        self.total_emitted
            .fetch_add(out.len() as u64, Ordering::Relaxed);
        out
    }

    /// Drop all state for a signal
    pub fn forget(&self, signal_id: &str) -> bool {
        self.windows.remove(signal_id).is_some()
    }

    pub fn stats(&self) -> AggregationStats {
        let total_in = self.total_in.load(Ordering::Relaxed);
        let total_emitted = self.total_emitted.load(Ordering::Relaxed);
        let reduction_ratio = if total_in == 0 {
            0.0
        } else {
            (1.0 - total_emitted as f64 / total_in as f64).clamp(0.0, 1.0)
        };

        let per_method_distribution = AggregationMethod::ALL
            .iter()
            .map(|m| (m.to_string(), self.per_method[m.index()].load(Ordering::Relaxed)))
            .filter(|(_, n)| *n > 0)
            .collect();

        let mut open_windows = 0;
        let mut buffered_samples = 0;
        for entry in self.windows.iter() {
            if entry.is_open() {
                open_windows += 1;
                buffered_samples += entry.sample_count();
            }
        }

        AggregationStats {
            total_in,
            total_emitted,
            reduction_ratio,
            per_method_distribution,
            open_windows,
            buffered_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Origin;
    use std::sync::Arc;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn point(signal: &str, secs: i64, value: f64) -> NormalizedPoint {
        NormalizedPoint::new(signal, value, t0() + chrono::Duration::seconds(secs))
    }

    #[test]
    fn test_passthrough() {
        let agg = Aggregator::new();
        let cfg = AggregationConfig::passthrough();
        for i in 0..5 {
            assert!(agg.ingest(point("sensor.a", i, i as f64), &cfg).is_some());
        }
        let stats = agg.stats();
        assert_eq!(stats.total_in, 5);
        assert_eq!(stats.total_emitted, 5);
        assert_eq!(stats.reduction_ratio, 0.0);
    }

    #[test]
    fn test_average_window_reduces_300_points_to_one() {
        let agg = Aggregator::new();
        let cfg = AggregationConfig::windowed(AggregationMethod::Average, Duration::from_secs(300));

        let mut inputs = Vec::new();
        for i in 0..300 {
            let v = (i % 17) as f64 * 1.5;
            inputs.push(v);
            assert!(agg.ingest(point("sensor.power", i, v), &cfg).is_none());
        }

        let closed = agg.close_expired(t0() + chrono::Duration::seconds(300));
        assert_eq!(closed.len(), 1);

        let mean = inputs.iter().sum::<f64>() / inputs.len() as f64;
        assert!((closed[0].value - mean).abs() < 1e-9);
        assert_eq!(closed[0].origin, Origin::Aggregated);
        assert_eq!(closed[0].timestamp, t0() + chrono::Duration::seconds(300));

        let stats = agg.stats();
        assert_eq!(stats.total_in, 300);
        assert_eq!(stats.total_emitted, 1);
        assert!(stats.reduction_ratio > 0.99);
        assert_eq!(stats.per_method_distribution.get("average"), Some(&300));
    }

    #[test]
    fn test_close_expired_skips_young_windows() {
        let agg = Aggregator::new();
        let cfg = AggregationConfig::windowed(AggregationMethod::Sum, Duration::from_secs(60));
        agg.ingest(point("sensor.a", 0, 1.0), &cfg);
        agg.ingest(point("sensor.b", 30, 1.0), &cfg);

        let closed = agg.close_expired(t0() + chrono::Duration::seconds(60));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].signal_id, "sensor.a");
        assert_eq!(agg.stats().open_windows, 1);
    }

    #[test]
    fn test_change_only_boolean_sequence() {
        let agg = Aggregator::new();
        let cfg = AggregationConfig::change_only(Some(0.5), None);

        let emitted: Vec<f64> = [1.0, 1.0, 1.0, 0.0, 0.0, 1.0]
            .into_iter()
            .enumerate()
            .filter_map(|(i, v)| {
                let mut p = point("binary_sensor.door", i as i64, v);
                p.origin = Origin::ConvertedBoolean;
                agg.ingest(p, &cfg)
            })
            .map(|p| p.value)
            .collect();

        assert_eq!(emitted, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_drain_all_emits_partial_windows() {
        let agg = Aggregator::new();
        let cfg = AggregationConfig::windowed(AggregationMethod::Last, Duration::from_secs(600));
        agg.ingest(point("sensor.a", 0, 1.0), &cfg);
        agg.ingest(point("sensor.a", 5, 9.0), &cfg);

        let drained = agg.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].value, 9.0);
        assert_eq!(drained[0].timestamp, t0() + chrono::Duration::seconds(5));
        assert!(agg.drain_all().is_empty());
    }

    #[test]
    fn test_signals_are_independent_across_threads() {
        let agg = Arc::new(Aggregator::new());
        let cfg = AggregationConfig::windowed(AggregationMethod::Count, Duration::from_secs(60));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let agg = Arc::clone(&agg);
                let cfg = cfg.clone();
                std::thread::spawn(move || {
                    let signal = format!("sensor.s{}", t);
                    for i in 0..50 {
                        agg.ingest(point(&signal, i % 60, 1.0), &cfg);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut closed = agg.drain_all();
        closed.sort_by(|a, b| a.signal_id.cmp(&b.signal_id));
        assert_eq!(closed.len(), 4);
        assert!(closed.iter().all(|p| p.value == 50.0));
    }
}
