//! Transmission history and transmitter health
//!
//! Keeps a bounded record of flush attempts and derives a health verdict
//! from consecutive failures, overall success rate and time since the last
//! success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

pub const HISTORY_CAPACITY: usize = 100;
pub const ERROR_CAPACITY: usize = 10;

const DEGRADED_CONSECUTIVE: u32 = 3;
const UNHEALTHY_CONSECUTIVE: u32 = 5;
/// Success-rate checks only apply after this many transmissions
const MIN_SAMPLE: u64 = 10;
const DEGRADED_SUCCESS_PCT: f64 = 80.0;
const UNHEALTHY_SUCCESS_PCT: f64 = 50.0;
const DEGRADED_SILENCE_SECS: i64 = 600;
const UNHEALTHY_SILENCE_SECS: i64 = 1800;

const MAX_ERROR_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionStatus {
    Success,
    Failed,
    /// Send abandoned at the send timeout
    Timeout,
    /// Points given up on, e.g. at shutdown
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionHealth {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl TransmissionHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionHealth::Unknown => "unknown",
            TransmissionHealth::Healthy => "healthy",
            TransmissionHealth::Degraded => "degraded",
            TransmissionHealth::Unhealthy => "unhealthy",
        }
    }
}

/// One transmission attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionRecord {
    pub timestamp: DateTime<Utc>,
    pub status: TransmissionStatus,
    pub data_points: usize,
    pub series_count: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub trigger: String,
}

impl TransmissionRecord {
    pub fn new(status: TransmissionStatus, data_points: usize, series_count: usize, trigger: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            data_points,
            series_count,
            duration_ms: 0,
            error_message: None,
            retry_count: 0,
            trigger: trigger.into(),
        }
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        let mut message = message.into();
        truncate(&mut message, MAX_ERROR_LEN);
        self.error_message = Some(message);
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub error_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransmissionStatistics {
    pub total_transmissions: u64,
    pub successful_transmissions: u64,
    /// Includes timed out sends
    pub failed_transmissions: u64,
    pub timed_out_transmissions: u64,
    /// Percent, 0 when nothing was sent
    pub success_rate: f64,
    pub total_data_points_sent: u64,
    pub average_data_points: f64,
    pub average_duration_ms: f64,
    pub consecutive_failures: u32,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub health_status: TransmissionHealth,
    pub consecutive_failures: u32,
    pub recent_errors_count: usize,
    pub last_error: Option<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Default)]
struct TrackerState {
    history: VecDeque<TransmissionRecord>,
    errors: VecDeque<ErrorEntry>,
    total: u64,
    successful: u64,
    failed: u64,
    timed_out: u64,
    data_points: u64,
    duration_ms: u64,
    consecutive_failures: u32,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
}

impl TrackerState {
    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }

    fn silence_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_success
            .map(|t| now.signed_duration_since(t).num_seconds())
    }

    fn health(&self, now: DateTime<Utc>) -> TransmissionHealth {
        if self.total == 0 {
            return TransmissionHealth::Unknown;
        }
        if self.consecutive_failures >= UNHEALTHY_CONSECUTIVE {
            return TransmissionHealth::Unhealthy;
        }
        if self.consecutive_failures >= DEGRADED_CONSECUTIVE {
            return TransmissionHealth::Degraded;
        }
        if self.total >= MIN_SAMPLE {
            let rate = self.success_rate();
            if rate < UNHEALTHY_SUCCESS_PCT {
                return TransmissionHealth::Unhealthy;
            }
            if rate < DEGRADED_SUCCESS_PCT {
                return TransmissionHealth::Degraded;
            }
        }
        match self.silence_secs(now) {
            Some(s) if s > UNHEALTHY_SILENCE_SECS => TransmissionHealth::Unhealthy,
            Some(s) if s > DEGRADED_SILENCE_SECS => TransmissionHealth::Degraded,
            _ => TransmissionHealth::Healthy,
        }
    }
}

/// Thread-safe transmission tracker
#[derive(Debug, Default)]
pub struct TransmissionTracker {
    state: Mutex<TrackerState>,
}

impl TransmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, record: TransmissionRecord) {
        let mut state = self.lock();

        state.total += 1;
        match record.status {
            TransmissionStatus::Success => {
                state.successful += 1;
                state.last_success = Some(record.timestamp);
                state.consecutive_failures = 0;
                state.data_points += record.data_points as u64;
                state.duration_ms += record.duration_ms;
                info!(
                    points = record.data_points,
                    series = record.series_count,
                    duration_ms = record.duration_ms,
                    trigger = %record.trigger,
                    "Transmission successful"
                );
            }
            TransmissionStatus::Failed
            | TransmissionStatus::Timeout
            | TransmissionStatus::Abandoned => {
                state.failed += 1;
                state.last_failure = Some(record.timestamp);
                state.consecutive_failures += 1;
                if record.status == TransmissionStatus::Timeout {
                    state.timed_out += 1;
                }
                let message = record.error_message.clone().unwrap_or_default();
                if state.errors.len() == ERROR_CAPACITY {
                    state.errors.pop_front();
                }
                state.errors.push_back(ErrorEntry {
                    timestamp: record.timestamp,
                    error_message: message.clone(),
                });
                error!(
                    status = ?record.status,
                    points = record.data_points,
                    error = %message,
                    consecutive_failures = state.consecutive_failures,
                    "Transmission failed"
                );
            }
        }

        if state.history.len() == HISTORY_CAPACITY {
            state.history.pop_front();
        }
        state.history.push_back(record);
    }

    /// Most recent records, newest last
    pub fn recent(&self, limit: usize) -> Vec<TransmissionRecord> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn recent_errors(&self) -> Vec<ErrorEntry> {
        self.lock().errors.iter().cloned().collect()
    }

    pub fn statistics(&self) -> TransmissionStatistics {
        let state = self.lock();
        let per_success = |total: u64| {
            if state.successful == 0 {
                0.0
            } else {
                total as f64 / state.successful as f64
            }
        };
        TransmissionStatistics {
            total_transmissions: state.total,
            successful_transmissions: state.successful,
            failed_transmissions: state.failed,
            timed_out_transmissions: state.timed_out,
            success_rate: round2(state.success_rate()),
            total_data_points_sent: state.data_points,
            average_data_points: round2(per_success(state.data_points)),
            average_duration_ms: round2(per_success(state.duration_ms)),
            consecutive_failures: state.consecutive_failures,
            last_success_time: state.last_success,
            last_failure_time: state.last_failure,
        }
    }

    pub fn health(&self) -> TransmissionHealth {
        self.health_at(Utc::now())
    }

    pub fn health_at(&self, now: DateTime<Utc>) -> TransmissionHealth {
        self.lock().health(now)
    }

    pub fn health_summary(&self) -> HealthSummary {
        self.health_summary_at(Utc::now())
    }

    pub fn health_summary_at(&self, now: DateTime<Utc>) -> HealthSummary {
        let state = self.lock();
        let mut recommendations = Vec::new();

        if state.consecutive_failures >= DEGRADED_CONSECUTIVE {
            recommendations.push(
                "Multiple consecutive failures. Check connectivity and credentials.".to_string(),
            );
        }
        if let Some(silence) = state.silence_secs(now).filter(|s| *s > DEGRADED_SILENCE_SECS) {
            recommendations.push(format!(
                "No successful transmission in {} minutes. Review error logs.",
                silence / 60
            ));
        }
        if state.total >= MIN_SAMPLE && state.success_rate() < DEGRADED_SUCCESS_PCT {
            recommendations.push(format!(
                "Low success rate ({:.1}%). Check endpoint configuration and network stability.",
                state.success_rate()
            ));
        }

        HealthSummary {
            health_status: state.health(now),
            consecutive_failures: state.consecutive_failures,
            recent_errors_count: state.errors.len(),
            last_error: state.errors.back().map(|e| e.error_message.clone()),
            recommendations,
        }
    }

    /// Zero counters, keep history
    pub fn reset_statistics(&self) {
        let mut state = self.lock();
        let history = std::mem::take(&mut state.history);
        let errors = std::mem::take(&mut state.errors);
        *state = TrackerState {
            history,
            errors,
            ..Default::default()
        };
    }

    pub fn clear_history(&self) {
        let mut state = self.lock();
        state.history.clear();
        state.errors.clear();
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn truncate(s: &mut String, max: usize) {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(points: usize) -> TransmissionRecord {
        TransmissionRecord::new(TransmissionStatus::Success, points, 1, "manual").duration_ms(10)
    }

    fn failure(msg: &str) -> TransmissionRecord {
        TransmissionRecord::new(TransmissionStatus::Failed, 5, 1, "time_interval").error(msg)
    }

    #[test]
    fn test_unknown_without_transmissions() {
        let tracker = TransmissionTracker::new();
        assert_eq!(tracker.health(), TransmissionHealth::Unknown);
        assert_eq!(tracker.statistics().success_rate, 0.0);
    }

    #[test]
    fn test_consecutive_failures_thresholds() {
        let tracker = TransmissionTracker::new();
        tracker.record(success(10));
        for _ in 0..3 {
            tracker.record(failure("connection refused"));
        }
        assert_eq!(tracker.health(), TransmissionHealth::Degraded);
        for _ in 0..2 {
            tracker.record(failure("connection refused"));
        }
        assert_eq!(tracker.health(), TransmissionHealth::Unhealthy);

        tracker.record(success(10));
        assert_eq!(tracker.statistics().consecutive_failures, 0);
    }

    #[test]
    fn test_success_rate_thresholds() {
        let tracker = TransmissionTracker::new();
        // 7 of 10 succeed, failures never consecutive
        for i in 0..10 {
            if i % 3 == 1 {
                tracker.record(failure("503"));
            } else {
                tracker.record(success(1));
            }
        }
        let stats = tracker.statistics();
        assert_eq!(stats.total_transmissions, 10);
        assert_eq!(stats.success_rate, 70.0);
        assert_eq!(tracker.health(), TransmissionHealth::Degraded);
        assert!(tracker
            .health_summary()
            .recommendations
            .iter()
            .any(|r| r.contains("Low success rate")));
    }

    #[test]
    fn test_silence_thresholds() {
        let tracker = TransmissionTracker::new();
        let then = Utc::now() - chrono::Duration::minutes(20);
        tracker.record(success(1).at(then));

        assert_eq!(tracker.health_at(then), TransmissionHealth::Healthy);
        assert_eq!(tracker.health(), TransmissionHealth::Degraded);
        assert_eq!(
            tracker.health_at(then + chrono::Duration::minutes(31)),
            TransmissionHealth::Unhealthy
        );
    }

    #[test]
    fn test_history_and_errors_bounded() {
        let tracker = TransmissionTracker::new();
        for i in 0..150 {
            tracker.record(failure(&format!("err {}", i)));
        }
        assert_eq!(tracker.recent(usize::MAX).len(), HISTORY_CAPACITY);
        let errors = tracker.recent_errors();
        assert_eq!(errors.len(), ERROR_CAPACITY);
        assert_eq!(errors.last().unwrap().error_message, "err 149");
        assert_eq!(tracker.recent(3).len(), 3);
        assert_eq!(
            tracker.health_summary().last_error.as_deref(),
            Some("err 149")
        );
    }

    #[test]
    fn test_averages_over_successes() {
        let tracker = TransmissionTracker::new();
        tracker.record(success(10));
        tracker.record(success(20));
        tracker.record(failure("x"));
        let stats = tracker.statistics();
        assert_eq!(stats.total_data_points_sent, 30);
        assert_eq!(stats.average_data_points, 15.0);
        assert_eq!(stats.average_duration_ms, 10.0);
        assert_eq!(stats.failed_transmissions, 1);
    }

    #[test]
    fn test_timeouts_count_as_failures() {
        let tracker = TransmissionTracker::new();
        tracker.record(success(10));
        tracker.record(
            TransmissionRecord::new(TransmissionStatus::Timeout, 5, 1, "time_interval")
                .error("send timed out after 30s"),
        );
        tracker.record(failure("HTTP 503"));

        let stats = tracker.statistics();
        assert_eq!(stats.failed_transmissions, 2);
        assert_eq!(stats.timed_out_transmissions, 1);
        assert_eq!(stats.consecutive_failures, 2);
        assert_eq!(
            tracker.recent_errors()[0].error_message,
            "send timed out after 30s"
        );
        assert_eq!(tracker.recent(1)[0].status, TransmissionStatus::Failed);
    }

    #[test]
    fn test_error_message_truncated() {
        let record = failure(&"x".repeat(500));
        assert_eq!(record.error_message.unwrap().len(), MAX_ERROR_LEN);
    }

    #[test]
    fn test_reset_keeps_history() {
        let tracker = TransmissionTracker::new();
        tracker.record(success(1));
        tracker.reset_statistics();
        assert_eq!(tracker.statistics().total_transmissions, 0);
        assert_eq!(tracker.recent(10).len(), 1);
        tracker.clear_history();
        assert!(tracker.recent(10).is_empty());
    }
}
