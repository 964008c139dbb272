//! Sensor bridge library
//!
//! Moves noisy sensor observations to a remote time-series store:
//! - Validation and unit normalization
//! - Per-signal aggregation
//! - Priority classification and a bounded three-tier buffer
//! - Strategy-driven flushing through a pluggable transmitter
//! - Health, metrics and transmission history

pub mod aggregation;
pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod flush;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod priority;
pub mod source;
pub mod status;
pub mod transmit;
pub mod validator;

pub use aggregation::{AggregationConfig, AggregationMethod, AggregationStats};
pub use buffer::{BufferSnapshot, PriorityBuffer};
pub use config::{
    BridgeConfig, BridgeSettings, BufferStrategy, ConfigProvider, FlushConfig, PerSignalConfig,
    PerformanceProfile, SignalSettings, StaticConfigProvider,
};
pub use error::{AggregationError, BridgeError, ConfigError};
pub use events::{FlushEvent, FlushOutcome};
pub use flush::{FlushTrigger, SchedulerState, ShutdownReport};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use metrics::MetricsSnapshot;
pub use models::*;
pub use observability::{BridgeMetrics, StructuredLogger};
pub use pipeline::{Bridge, BridgeBuilder, IngestOutcome};
pub use source::{ChannelSource, EventSource, ObservationHandler};
pub use status::{TransmissionHealth, TransmissionRecord, TransmissionTracker};
pub use transmit::{SendOutcome, Transmitter};
pub use validator::{RejectionReason, Validator, ValidatorConfig};
