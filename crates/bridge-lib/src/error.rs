//! Error types for the bridge library

use thiserror::Error;

/// Invalid configuration detected while resolving settings
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown aggregation method '{0}'")]
    UnknownAggregationMethod(String),

    #[error("unknown buffer strategy '{0}'")]
    UnknownBufferStrategy(String),

    #[error("unknown priority '{0}'")]
    UnknownPriority(String),

    #[error("unknown performance profile '{0}'")]
    UnknownProfile(String),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Malformed aggregation settings for a single signal
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("aggregation window must be positive for method '{method}'")]
    NonPositiveWindow { method: String },

    #[error("change threshold must be non-negative, got {0}")]
    NegativeThreshold(f64),
}

/// Errors surfaced by the running bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge is stopped")]
    Stopped,

    #[error("flush scheduler task failed: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
