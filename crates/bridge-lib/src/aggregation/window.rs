//! Per-signal aggregation state

use super::method::{AggregationConfig, AggregationMethod};
use crate::models::{NormalizedPoint, Origin};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

const CHANGE_EPSILON: f64 = 1e-9;

/// Running statistics of one signal's open window plus change-only state.
///
/// The window is reset in place when it closes; the sample vector keeps its
/// allocation and is only filled for `median`.
#[derive(Debug, Clone)]
pub struct AggregationWindow {
    method: AggregationMethod,
    length: Duration,
    start: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    first: f64,
    last: f64,
    samples: Vec<f64>,
    template: Option<NormalizedPoint>,
    last_emitted: Option<f64>,
}

impl Default for AggregationWindow {
    fn default() -> Self {
        Self {
            method: AggregationMethod::None,
            length: Duration::ZERO,
            start: None,
            last_seen: None,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            first: 0.0,
            last: 0.0,
            samples: Vec::new(),
            template: None,
            last_emitted: None,
        }
    }
}

impl AggregationWindow {
    pub fn is_open(&self) -> bool {
        self.start.is_some()
    }

    pub fn sample_count(&self) -> u64 {
        self.count
    }

    pub fn method(&self) -> AggregationMethod {
        self.method
    }

    /// Whether the open window has reached its length at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.start {
            Some(start) => elapsed(start, now) >= self.length,
            None => false,
        }
    }

    /// Feed a point into a windowed method. Returns the closed window's
    /// point when `point` falls past the end of the open window; `point`
    /// then opens the next window under `config`.
    pub fn push(&mut self, point: NormalizedPoint, config: &AggregationConfig) -> Option<NormalizedPoint> {
        let emitted = if self.is_expired(point.timestamp) {
            self.close_at_deadline()
        } else {
            None
        };

        if !self.is_open() {
            // Settings are captured per window so reconfiguration applies to the next one
            self.method = config.method;
            self.length = config.window;
            self.start = Some(point.timestamp);
        }

        self.record(point);
        emitted
    }

    /// Close the window if it is open, stamping with its deadline
    pub fn close_at_deadline(&mut self) -> Option<NormalizedPoint> {
        let start = self.start?;
        let length =
            chrono::Duration::from_std(self.length).unwrap_or_else(|_| chrono::Duration::zero());
        let close_at = start + length;
        self.close(close_at)
    }

    /// Close a partially filled window, stamping with its latest sample
    pub fn close_now(&mut self) -> Option<NormalizedPoint> {
        let at = self.last_seen?;
        self.close(at)
    }

    /// Change-only decision for a single point
    pub fn change_only(&mut self, point: NormalizedPoint, config: &AggregationConfig) -> Option<NormalizedPoint> {
        let value = point.value;
        let emit = match self.last_emitted {
            None => true,
            Some(last) => {
                let delta = (value - last).abs();
                if point.is_boolean_domain() {
                    delta > 0.0
                } else {
                    match (config.min_change_threshold, config.min_change_absolute) {
                        (None, None) => delta > 0.0,
                        (relative, absolute) => {
                            let rel_hit = relative
                                .map(|t| delta / last.abs().max(CHANGE_EPSILON) >= t)
                                .unwrap_or(false);
                            let abs_hit = absolute.map(|a| delta > a).unwrap_or(false);
                            delta > 0.0 && (rel_hit || abs_hit)
                        }
                    }
                }
            }
        };

        if emit {
            self.last_emitted = Some(value);
            Some(point)
        } else {
            None
        }
    }

    fn record(&mut self, point: NormalizedPoint) {
        let v = point.value;
        if self.count == 0 {
            self.first = v;
        }
        self.count += 1;
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.last = v;
        if self.method == AggregationMethod::Median {
            self.samples.push(v);
        }
        self.last_seen = Some(point.timestamp);
        self.template = Some(point);
    }

    fn close(&mut self, at: DateTime<Utc>) -> Option<NormalizedPoint> {
        let result = self.statistic();
        let template = self.template.take();
        self.reset();

        let (value, mut point) = (result?, template?);
        point.value = value;
        point.timestamp = at;
        point.received_at = Instant::now();
        point.origin = Origin::Aggregated;
        self.last_emitted = Some(value);
        Some(point)
    }

    fn statistic(&mut self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let value = match self.method {
            AggregationMethod::Average => self.sum / self.count as f64,
            AggregationMethod::Median => median(&mut self.samples)?,
            AggregationMethod::Min => self.min,
            AggregationMethod::Max => self.max,
            AggregationMethod::Sum => self.sum,
            AggregationMethod::First => self.first,
            AggregationMethod::Last => self.last,
            AggregationMethod::Count => self.count as f64,
            AggregationMethod::None | AggregationMethod::ChangeOnly => self.last,
        };
        Some(value)
    }

    fn reset(&mut self) {
        self.start = None;
        self.last_seen = None;
        self.count = 0;
        self.sum = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        self.first = 0.0;
        self.last = 0.0;
        self.samples.clear();
    }
}

fn elapsed(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(start).to_std().unwrap_or_default()
}

fn median(samples: &mut [f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let mid = samples.len() / 2;
    if samples.len() % 2 == 0 {
        Some((samples[mid - 1] + samples[mid]) / 2.0)
    } else {
        Some(samples[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at(secs: i64, value: f64) -> NormalizedPoint {
        NormalizedPoint::new("sensor.t", value, t0() + chrono::Duration::seconds(secs))
    }

    fn cfg(method: AggregationMethod) -> AggregationConfig {
        AggregationConfig::windowed(method, Duration::from_secs(60))
    }

    #[test]
    fn test_single_sample_statistics() {
        for (method, expected) in [
            (AggregationMethod::Average, 7.0),
            (AggregationMethod::Median, 7.0),
            (AggregationMethod::Min, 7.0),
            (AggregationMethod::Max, 7.0),
            (AggregationMethod::First, 7.0),
            (AggregationMethod::Last, 7.0),
            (AggregationMethod::Sum, 7.0),
            (AggregationMethod::Count, 1.0),
        ] {
            let mut w = AggregationWindow::default();
            assert!(w.push(at(0, 7.0), &cfg(method)).is_none());
            let p = w.close_at_deadline().unwrap();
            assert_eq!(p.value, expected, "method {}", method);
            assert_eq!(p.origin, Origin::Aggregated);
        }
    }

    #[test]
    fn test_window_closes_on_late_point() {
        let mut w = AggregationWindow::default();
        let c = cfg(AggregationMethod::Max);
        assert!(w.push(at(0, 1.0), &c).is_none());
        assert!(w.push(at(30, 5.0), &c).is_none());
        let p = w.push(at(60, 2.0), &c).unwrap();
        assert_eq!(p.value, 5.0);
        assert_eq!(p.timestamp, t0() + chrono::Duration::seconds(60));
        // the late point opened the next window
        assert!(w.is_open());
        assert_eq!(w.sample_count(), 1);
    }

    #[test]
    fn test_median_even_count() {
        let mut w = AggregationWindow::default();
        let c = cfg(AggregationMethod::Median);
        for (i, v) in [4.0, 1.0, 3.0, 2.0].into_iter().enumerate() {
            w.push(at(i as i64, v), &c);
        }
        assert_eq!(w.close_at_deadline().unwrap().value, 2.5);
    }

    #[test]
    fn test_empty_window_emits_nothing() {
        let mut w = AggregationWindow::default();
        assert!(w.close_at_deadline().is_none());
        assert!(w.close_now().is_none());
    }

    #[test]
    fn test_settings_snapshot_per_window() {
        let mut w = AggregationWindow::default();
        w.push(at(0, 1.0), &cfg(AggregationMethod::Sum));
        // reconfigured mid-window: still sums until close
        w.push(at(10, 2.0), &cfg(AggregationMethod::Max));
        assert_eq!(w.close_at_deadline().unwrap().value, 3.0);

        w.push(at(100, 1.0), &cfg(AggregationMethod::Max));
        w.push(at(110, 2.0), &cfg(AggregationMethod::Max));
        assert_eq!(w.close_at_deadline().unwrap().value, 2.0);
    }

    #[test]
    fn test_change_only_relative_and_absolute() {
        let mut w = AggregationWindow::default();
        let c = AggregationConfig::change_only(Some(0.10), Some(5.0));
        assert!(w.change_only(at(0, 100.0), &c).is_some());
        // 5% change, below both thresholds
        assert!(w.change_only(at(1, 105.0), &c).is_none());
        // 10% relative to last emitted 100
        assert!(w.change_only(at(2, 110.0), &c).is_some());
        // absolute delta 6 > 5 but relative 5.4% < 10%
        assert!(w.change_only(at(3, 116.0), &c).is_some());
        assert!(w.change_only(at(4, 116.0), &c).is_none());
    }

    #[test]
    fn test_change_only_without_thresholds_emits_any_change() {
        let mut w = AggregationWindow::default();
        let c = AggregationConfig::change_only(None, None);
        assert!(w.change_only(at(0, 1.5), &c).is_some());
        assert!(w.change_only(at(1, 1.5), &c).is_none());
        assert!(w.change_only(at(2, 1.6), &c).is_some());
    }
}
