//! The bridge pipeline
//!
//! Wires validation, classification, aggregation and buffering on the
//! producer side to the flush scheduler on the consumer side. Producers call
//! [`Bridge::ingest`] (directly or through an attached [`EventSource`]) from
//! any thread; a single spawned task drains the buffer.


use crate::aggregation::{AggregationConfig, AggregationStats, Aggregator};
use crate::buffer::{BufferSnapshot, PriorityBuffer};
use crate::config::{BridgeConfig, BufferStrategy, ConfigProvider, FlushConfig, PerSignalConfig, StaticConfigProvider};
use crate::error::BridgeError;
use crate::events::{self, FlushEvent};
use crate::flush::{FlushScheduler, FlushSignals, SchedulerState, ShutdownReport};
use crate::health::{components, HealthRegistry};
use crate::metrics::{MetricsAccumulator, MetricsSnapshot};
use crate::models::{NormalizedPoint, Priority, RawObservation};
use crate::observability::StructuredLogger;
use crate::priority::PriorityClassifier;
use crate::source::{EventSource, ObservationHandler};
use crate::status::TransmissionTracker;
use crate::transmit::Transmitter;
use crate::validator::{RejectionReason, Validator};
use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// What happened to one observation
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Entered the buffer with this priority
    Buffered(Priority),
    /// Absorbed into an aggregation window or suppressed by `change_only`
    Aggregated,
    Rejected(RejectionReason),
    /// Signal is disabled
    Ignored,
    /// Bridge is shutting down
    Closed,
}

/// State shared by producers and the flush task
pub(crate) struct Shared {
    pub(crate) config: BridgeConfig,
    validator: Validator,
    classifier: PriorityClassifier,
    provider: Arc<dyn ConfigProvider>,
    pub(crate) aggregator: Aggregator,
    pub(crate) buffer: PriorityBuffer,
    pub(crate) metrics: MetricsAccumulator,
    pub(crate) tracker: TransmissionTracker,
    pub(crate) signals: Arc<FlushSignals>,
    pub(crate) events: broadcast::Sender<FlushEvent>,
    pub(crate) health: HealthRegistry,
    pub(crate) logger: StructuredLogger,
}

impl Shared {
    fn ingest(&self, obs: RawObservation) -> IngestOutcome {
        if self.signals.is_closed() {
            return IngestOutcome::Closed;
        }

        let config = self.provider.get(&obs.signal_id);
        if !config.enabled {
            self.metrics.record_ignored();
            self.aggregator.forget(&obs.signal_id);
            trace!(signal_id = %obs.signal_id, "Signal disabled, ignoring observation");
            return IngestOutcome::Ignored;
        }

        let point = match self.validator.validate(&obs) {
            Ok(point) => point,
            Err(reason) => {
                self.metrics.record_rejected(&reason);
                self.logger
                    .log_rejection(&obs.signal_id, reason.label(), &reason.to_string());
                return IngestOutcome::Rejected(reason);
            }
        };
        self.metrics.record_valid(point.origin);

        let priority = self.classifier.classify_with_override(
            &point.signal_id,
            point.device_class.as_deref(),
            config.priority,
        );
        let point = point.with_priority(priority);

        let passthrough;
        let aggregation = match config.aggregation.validate() {
            Ok(()) => &config.aggregation,
            Err(e) => {
                warn!(signal_id = %point.signal_id, error = %e, "Invalid aggregation config, passing through");
                passthrough = AggregationConfig::passthrough();
                &passthrough
            }
        };

        match self.aggregator.ingest(point, aggregation) {
            Some(point) => {
                self.metrics.record_aggregation(true);
                self.admit(point, &config);
                IngestOutcome::Buffered(priority)
            }
            None => {
                self.metrics.record_aggregation(false);
                IngestOutcome::Aggregated
            }
        }
    }

    /// Enqueue a point emitted by a window close
    pub(crate) fn admit_aggregated(&self, point: NormalizedPoint) {
        let config = self.provider.get(&point.signal_id);
        self.admit(point, &config);
    }

    fn admit(&self, point: NormalizedPoint, config: &PerSignalConfig) {
        let flush = &self.config.flush;
        let priority = point.priority;
        let received = point.received_at;

        let outcome = self.buffer.enqueue(point);
        self.metrics.record_enqueued(priority, outcome.evicted.len());
        if !outcome.evicted.is_empty() {
            self.report_lost(outcome.evicted.len(), "eviction");
        }

        self.signals.record_arrival(received);
        if let Some(interval) = config.transmission_interval {
            self.signals.arm_deadline(received + interval);
        }

        let urgent = config.buffer_strategy == Some(BufferStrategy::Priority)
            || (priority == Priority::High
                && (flush.priority_immediate || flush.strategy == BufferStrategy::Priority));
        if urgent {
            self.signals.request_priority(priority);
        } else if outcome.size >= flush.max_batch_size && flush.strategy != BufferStrategy::Time {
            self.signals.wake();
        }
    }

    /// Log and publish discarded points. Counters are updated by the caller.
    pub(crate) fn report_lost(&self, count: usize, cause: &str) {
        self.logger.log_points_lost(count, cause);
        events::publish(
            &self.events,
            FlushEvent::PointsLost {
                count,
                cause: cause.to_string(),
            },
        );
    }
}

/// A running bridge
pub struct Bridge {
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<ShutdownReport>>>,
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Validate, classify, aggregate and buffer one observation
    pub fn ingest(&self, obs: RawObservation) -> IngestOutcome {
        self.shared.ingest(obs)
    }

    /// Handler that feeds observations into this bridge
    pub fn handler(&self) -> ObservationHandler {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |obs| {
            shared.ingest(obs);
        })
    }

    /// Subscribe this bridge to `signal_ids` on `source`
    pub fn attach(&self, source: &dyn EventSource, signal_ids: &[String]) -> usize {
        source.subscribe(signal_ids, self.handler())
    }

    /// Request a manual flush of every tier. Requests made while one is
    /// pending or in flight coalesce into a single follow-up cycle.
    /// Returns false once the bridge is shutting down.
    pub fn flush_now(&self) -> bool {
        if self.shared.signals.is_closed() {
            return false;
        }
        self.shared.signals.request_manual();
        true
    }

    pub fn buffer_snapshot(&self) -> BufferSnapshot {
        self.shared.buffer.size_by_priority()
    }

    pub fn aggregation_stats(&self) -> AggregationStats {
        self.shared.aggregator.stats()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn transmissions(&self) -> &TransmissionTracker {
        &self.shared.tracker
    }

    /// Stream of flush outcomes and loss notifications
    pub fn subscribe(&self) -> broadcast::Receiver<FlushEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.signals.state()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.shared.health
    }

    /// Stop intake, run the final flush and wait for the scheduler to stop
    pub async fn shutdown(&self) -> Result<ShutdownReport, BridgeError> {
        if !self.shared.signals.close() {
            return Err(BridgeError::Stopped);
        }
        let handle = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let _ = self.shutdown_tx.send(());

        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| BridgeError::Scheduler(e.to_string())),
            None => Err(BridgeError::Stopped),
        }
    }
}

/// Builder for starting a [`Bridge`]
pub struct BridgeBuilder {
    config: BridgeConfig,
    transmitter: Option<Arc<dyn Transmitter>>,
    provider: Option<Arc<dyn ConfigProvider>>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            transmitter: None,
            provider: None,
            health: None,
            logger: None,
        }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn flush_config(mut self, flush: FlushConfig) -> Self {
        self.config.flush = flush;
        self
    }

    pub fn transmitter(mut self, transmitter: Arc<dyn Transmitter>) -> Self {
        self.transmitter = Some(transmitter);
        self
    }

    /// Per-signal configuration; defaults to an empty [`StaticConfigProvider`]
    pub fn provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the pipeline and spawn the flush scheduler on the current runtime
    pub async fn start(self) -> Result<Bridge> {
        let transmitter = self
            .transmitter
            .ok_or_else(|| anyhow!("Transmitter is required"))?;
        if self.config.flush.max_batch_size == 0 {
            return Err(anyhow!("max_batch_size must be at least 1"));
        }

        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(StaticConfigProvider::new()));
        let health = self.health.unwrap_or_default();
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new("sensor-bridge"));

        for component in [
            components::BUFFER,
            components::SCHEDULER,
            components::TRANSMITTER,
            components::AGGREGATOR,
        ] {
            health.register(component).await;
        }

        let config = self.config;
        let shared = Arc::new(Shared {
            validator: Validator::new(config.validator.clone()),
            classifier: PriorityClassifier::new(),
            provider,
            aggregator: Aggregator::new(),
            buffer: PriorityBuffer::new(config.flush.hard_cap),
            metrics: MetricsAccumulator::new(),
            tracker: TransmissionTracker::new(),
            signals: Arc::new(FlushSignals::new(config.flush.adaptive_rate_window)),
            events: events::channel(),
            health: health.clone(),
            logger: logger.clone(),
            config,
        });

        logger.log_startup(
            env!("CARGO_PKG_VERSION"),
            shared.config.flush.strategy.as_str(),
            transmitter.name(),
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let scheduler = FlushScheduler::new(Arc::clone(&shared), transmitter);
        let task = tokio::spawn(scheduler.run(shutdown_rx));
        health.set_ready(true).await;

        Ok(Bridge {
            shared,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        })
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
