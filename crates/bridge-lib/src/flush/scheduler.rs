//! Flush scheduler task
//!
//! A single task owns the drain side of the buffer. It wakes on a fixed
//! check interval or when a producer raises a flag, sweeps expired
//! aggregation windows, evaluates the configured strategy and runs at most
//! one flush cycle at a time. The buffer lock is held only while draining;
//! sends happen without it.

use super::rate::adaptive_interval;
use super::trigger::{FlushDecision, FlushTrigger, SchedulerState};
use crate::config::BufferStrategy;
use crate::events::{self, FlushEvent, FlushOutcome};
use crate::health::{components, ComponentHealth};
use crate::metrics::MetricsSnapshot;
use crate::models::Priority;
use crate::pipeline::Shared;
use crate::status::{TransmissionRecord, TransmissionStatus};
use crate::transmit::{series_count, SendOutcome, Transmitter};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Buffer fill ratio reported as degraded
const BUFFER_PRESSURE: f64 = 0.9;

/// Final accounting returned by a shutdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Points delivered by the final flush, including batches acknowledged
    /// before a timeout cut it short
    pub points_flushed: usize,
    /// Points still buffered or in flight when the final flush ended
    pub points_lost: usize,
    pub timed_out: bool,
    pub metrics: MetricsSnapshot,
}

pub struct FlushScheduler {
    shared: Arc<Shared>,
    transmitter: Arc<dyn Transmitter>,
    last_flush: Instant,
    interval: Duration,
    /// Points of the batch currently awaiting the transmitter
    in_flight: usize,
    /// Points acknowledged so far in the current cycle
    cycle_sent: usize,
    consecutive_failures: u32,
}

impl FlushScheduler {
    pub(crate) fn new(shared: Arc<Shared>, transmitter: Arc<dyn Transmitter>) -> Self {
        let flush = &shared.config.flush;
        let interval = match flush.strategy {
            BufferStrategy::Adaptive => flush.adaptive_max_interval,
            _ => flush.batch_interval,
        };
        Self {
            shared,
            transmitter,
            last_flush: Instant::now(),
            interval,
            in_flight: 0,
            cycle_sent: 0,
            consecutive_failures: 0,
        }
    }

    /// Run until `shutdown` fires (or its sender is dropped), then perform
    /// the final flush.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> ShutdownReport {
        let signals = Arc::clone(&self.shared.signals);
        let flush = &self.shared.config.flush;
        info!(
            strategy = %flush.strategy,
            interval_secs = flush.batch_interval.as_secs(),
            max_batch_size = flush.max_batch_size,
            transmitter = %self.transmitter.name(),
            "Starting flush scheduler"
        );

        self.last_flush = Instant::now();
        signals.set_state(SchedulerState::Armed);
        self.shared.health.set_healthy(components::SCHEDULER).await;

        let mut ticker = interval(self.shared.config.flush.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Shutting down flush scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_windows();
                }
                _ = signals.notified() => {}
            }

            if let Some(decision) = self.evaluate(Instant::now()) {
                self.flush(decision).await;
            }
        }

        self.finish().await
    }

    /// Emit aggregation windows whose length has elapsed
    fn sweep_windows(&self) {
        let closed = self.shared.aggregator.close_expired(Utc::now());
        if closed.is_empty() {
            return;
        }
        debug!(count = closed.len(), "Closed expired aggregation windows");
        self.shared.metrics.record_window_closes(closed.len());
        for point in closed {
            self.shared.admit_aggregated(point);
        }
    }

    /// Interval for time-based triggers, refreshing the adaptive estimate
    fn current_interval(&mut self, now: Instant) -> Duration {
        let flush = &self.shared.config.flush;
        let rate = self.shared.signals.arrival_rate(now);
        self.interval = if flush.strategy == BufferStrategy::Adaptive {
            adaptive_interval(rate, flush.adaptive_min_interval, flush.adaptive_max_interval)
        } else {
            flush.batch_interval
        };
        self.shared
            .metrics
            .record_rate(rate, self.interval.as_secs_f64());
        self.interval
    }

    /// Pick the next flush, if any trigger holds at `now`
    pub(crate) fn evaluate(&mut self, now: Instant) -> Option<FlushDecision> {
        let signals = Arc::clone(&self.shared.signals);

        if signals.take_manual() {
            return Some(FlushDecision::all(FlushTrigger::Manual));
        }
        let urgent = signals.take_urgent();
        if !urgent.is_empty() {
            return Some(FlushDecision::tiers(FlushTrigger::Priority, urgent));
        }

        let flush = &self.shared.config.flush;
        let (strategy, max_batch_size) = (flush.strategy, flush.max_batch_size);
        let size = self.shared.buffer.size();
        let full = size >= max_batch_size;
        let elapsed = now.saturating_duration_since(self.last_flush);
        let interval = self.current_interval(now);

        let trigger = match strategy {
            BufferStrategy::Time => (elapsed >= interval).then_some(FlushTrigger::TimeInterval),
            BufferStrategy::Size | BufferStrategy::Priority => {
                full.then_some(FlushTrigger::SizeLimit)
            }
            BufferStrategy::Hybrid => {
                if full {
                    Some(FlushTrigger::SizeLimit)
                } else {
                    (elapsed >= interval).then_some(FlushTrigger::TimeInterval)
                }
            }
            BufferStrategy::Adaptive => {
                if full {
                    Some(FlushTrigger::SizeLimit)
                } else {
                    (elapsed >= interval).then_some(FlushTrigger::Adaptive)
                }
            }
        };

        trigger
            .or_else(|| {
                signals
                    .deadline_due(now)
                    .then_some(FlushTrigger::TimeInterval)
            })
            .map(FlushDecision::all)
    }

    /// Run one flush cycle for `decision`
    pub(crate) async fn flush(&mut self, decision: FlushDecision) -> FlushOutcome {
        let shared = Arc::clone(&self.shared);
        let signals = &shared.signals;
        let trigger = decision.trigger;
        // Partial cycles leave the interval timer alone so lower tiers still
        // go out on schedule
        let covers_all = decision.tiers.len() == Priority::ALL.len();
        self.cycle_sent = 0;

        if signals.state() != SchedulerState::Stopped {
            signals.set_state(SchedulerState::Flushing);
        }
        if covers_all {
            signals.clear_deadline();
        }

        let started = Instant::now();
        let snapshot = shared.buffer.size_by_priority();
        let budget: usize = decision.tiers.iter().map(|p| snapshot.get(*p)).sum();

        let mut outcome = FlushOutcome {
            trigger,
            points_sent: 0,
            batches: 0,
            points_requeued: 0,
            timed_out: false,
            duration_ms: 0,
            error: None,
            completed_at: Utc::now(),
        };

        if budget == 0 {
            if covers_all && trigger.is_timed() {
                debug!(trigger = %trigger, "Nothing buffered, resetting flush timer");
                self.last_flush = Instant::now();
            }
            self.rearm();
            return outcome;
        }

        shared.metrics.record_flush_start(trigger, snapshot.total);
        let max_batch_size = shared.config.flush.max_batch_size;
        let send_timeout = shared.config.flush.send_timeout;

        while outcome.points_sent < budget {
            let take = max_batch_size.min(budget - outcome.points_sent);
            let batch = shared.buffer.drain_tiers(take, &decision.tiers);
            if batch.is_empty() {
                break;
            }
            let points = batch.len();
            let series = series_count(&batch);

            self.in_flight = points;
            let send_started = Instant::now();
            let result =
                tokio::time::timeout(send_timeout, self.transmitter.send(&batch)).await;
            let elapsed = send_started.elapsed();
            self.in_flight = 0;

            let send = result.unwrap_or_else(|_| {
                SendOutcome::timeout(format!("send timed out after {}s", send_timeout.as_secs()))
            });
            let timed_out = send.is_timeout();

            match send {
                SendOutcome::Success => {
                    outcome.points_sent += points;
                    outcome.batches += 1;
                    self.cycle_sent = outcome.points_sent;
                    self.consecutive_failures = 0;
                    shared.metrics.record_batch_sent(points, elapsed.as_secs_f64());
                    shared.tracker.record(
                        TransmissionRecord::new(TransmissionStatus::Success, points, series, trigger.as_str())
                            .duration_ms(elapsed.as_millis() as u64),
                    );
                }
                SendOutcome::Failure(detail) | SendOutcome::Timeout(detail) => {
                    let status = if timed_out {
                        TransmissionStatus::Timeout
                    } else {
                        TransmissionStatus::Failed
                    };
                    let evicted = shared.buffer.requeue_front(batch);
                    shared.metrics.record_batch_failed(
                        points,
                        evicted.len(),
                        elapsed.as_secs_f64(),
                        timed_out,
                    );
                    shared.tracker.record(
                        TransmissionRecord::new(status, points, series, trigger.as_str())
                            .duration_ms(elapsed.as_millis() as u64)
                            .retry_count(self.consecutive_failures)
                            .error(detail.clone()),
                    );
                    self.consecutive_failures += 1;
                    if !evicted.is_empty() {
                        shared.report_lost(evicted.len(), "eviction");
                    }
                    outcome.points_requeued = points;
                    outcome.timed_out = timed_out;
                    outcome.error = Some(detail);
                    break;
                }
            }
        }

        if covers_all {
            self.last_flush = Instant::now();
        }
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        outcome.completed_at = Utc::now();
        shared
            .metrics
            .record_flush_end(trigger, outcome.points_sent, outcome.is_success());

        match &outcome.error {
            None => {
                shared.logger.log_flush(
                    trigger.as_str(),
                    outcome.points_sent,
                    outcome.batches,
                    outcome.duration_ms,
                );
                events::publish(&shared.events, FlushEvent::Completed(outcome.clone()));
            }
            Some(error) => {
                shared
                    .logger
                    .log_flush_failed(trigger.as_str(), outcome.points_requeued, error);
                events::publish(&shared.events, FlushEvent::Failed(outcome.clone()));
            }
        }

        self.update_health().await;
        self.rearm();
        outcome
    }

    fn rearm(&self) {
        if self.shared.signals.state() == SchedulerState::Flushing {
            self.shared.signals.set_state(SchedulerState::Armed);
        }
    }

    async fn update_health(&self) {
        let shared = &self.shared;
        let summary = shared.tracker.health_summary();
        shared
            .health
            .update(
                components::TRANSMITTER,
                ComponentHealth::from_transmission(summary.health_status, summary.last_error),
            )
            .await;

        let size = shared.buffer.size();
        let cap = shared.buffer.hard_cap();
        if size as f64 >= cap as f64 * BUFFER_PRESSURE {
            shared
                .health
                .set_degraded(components::BUFFER, format!("{} of {} points buffered", size, cap))
                .await;
        } else {
            shared.health.set_healthy(components::BUFFER).await;
        }
        shared.metrics.record_buffer(&shared.buffer.size_by_priority());
    }

    /// Close windows, run the bounded final flush and account for leftovers
    async fn finish(mut self) -> ShutdownReport {
        let shared = Arc::clone(&self.shared);

        let closed = shared.aggregator.drain_all();
        if !closed.is_empty() {
            info!(count = closed.len(), "Emitting partial aggregation windows");
            shared.metrics.record_window_closes(closed.len());
            for point in closed {
                shared.admit_aggregated(point);
            }
        }

        let shutdown_timeout = shared.config.flush.shutdown_timeout;
        let result = tokio::time::timeout(
            shutdown_timeout,
            self.flush(FlushDecision::all(FlushTrigger::Shutdown)),
        )
        .await;

        let (points_flushed, timed_out) = match result {
            Ok(outcome) => (outcome.points_sent, false),
            Err(_) => {
                warn!(
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Final flush timed out"
                );
                (self.cycle_sent, true)
            }
        };

        let leftovers = shared.buffer.drain_all();
        let points_lost = leftovers.len() + if timed_out { self.in_flight } else { 0 };
        if points_lost > 0 {
            shared.tracker.record(
                TransmissionRecord::new(
                    TransmissionStatus::Abandoned,
                    points_lost,
                    series_count(&leftovers),
                    FlushTrigger::Shutdown.as_str(),
                )
                .error(if timed_out {
                    "final flush timed out"
                } else {
                    "final flush incomplete"
                }),
            );
            shared.metrics.record_lost(points_lost);
            shared.report_lost(points_lost, "shutdown");
        }

        shared.signals.set_state(SchedulerState::Stopped);
        shared
            .health
            .set_unhealthy(components::SCHEDULER, "stopped")
            .await;
        shared.health.set_ready(false).await;
        shared.logger.log_shutdown("requested", points_lost);

        ShutdownReport {
            points_flushed,
            points_lost,
            timed_out,
            metrics: shared.metrics.snapshot(),
        }
    }
}
