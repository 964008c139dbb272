//! Bridge configuration
//!
//! Raw, stringly-typed settings ([`BridgeSettings`]) are deserialized by the
//! binary and resolved exactly once into typed values ([`BridgeConfig`] and a
//! [`StaticConfigProvider`]). Unknown names fail resolution; a malformed
//! aggregation window only disables aggregation for that signal.

use crate::aggregation::{AggregationConfig, AggregationMethod};
use crate::buffer::DEFAULT_HARD_CAP;
use crate::error::ConfigError;
use crate::models::Priority;
use crate::validator::ValidatorConfig;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// When buffered points are flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStrategy {
    /// Fixed interval, size ignored
    Time,
    /// Only size and priority triggers
    Size,
    /// HIGH immediately, other tiers by size
    Priority,
    /// First of time, size or priority
    #[default]
    Hybrid,
    /// Interval derived from the arrival rate
    Adaptive,
}

impl BufferStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferStrategy::Time => "time",
            BufferStrategy::Size => "size",
            BufferStrategy::Priority => "priority",
            BufferStrategy::Hybrid => "hybrid",
            BufferStrategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for BufferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BufferStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "time" => Ok(BufferStrategy::Time),
            "size" => Ok(BufferStrategy::Size),
            "priority" => Ok(BufferStrategy::Priority),
            "hybrid" => Ok(BufferStrategy::Hybrid),
            "adaptive" => Ok(BufferStrategy::Adaptive),
            _ => Err(ConfigError::UnknownBufferStrategy(s.to_string())),
        }
    }
}

impl FromStr for Priority {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(ConfigError::UnknownPriority(s.to_string())),
        }
    }
}

/// Preset trade-offs between latency and request volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceProfile {
    Minimal,
    Balanced,
    HighPerformance,
    RealTime,
}

/// Values a profile supplies when not set explicitly
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDefaults {
    pub batch_interval: Duration,
    pub max_batch_size: usize,
    pub strategy: BufferStrategy,
    pub hard_cap: usize,
    /// Aggregation applied to signals that configure none
    pub default_aggregation: Option<AggregationConfig>,
}

impl PerformanceProfile {
    pub fn defaults(&self) -> ProfileDefaults {
        match self {
            PerformanceProfile::Minimal => ProfileDefaults {
                batch_interval: Duration::from_secs(600),
                max_batch_size: 50,
                strategy: BufferStrategy::Time,
                hard_cap: 100,
                default_aggregation: Some(AggregationConfig::windowed(
                    AggregationMethod::Average,
                    Duration::from_secs(600),
                )),
            },
            PerformanceProfile::Balanced => ProfileDefaults {
                batch_interval: Duration::from_secs(300),
                max_batch_size: 100,
                strategy: BufferStrategy::Hybrid,
                hard_cap: 500,
                default_aggregation: None,
            },
            PerformanceProfile::HighPerformance => ProfileDefaults {
                batch_interval: Duration::from_secs(60),
                max_batch_size: 200,
                strategy: BufferStrategy::Priority,
                hard_cap: 1000,
                default_aggregation: None,
            },
            PerformanceProfile::RealTime => ProfileDefaults {
                batch_interval: Duration::from_secs(30),
                max_batch_size: 500,
                strategy: BufferStrategy::Priority,
                hard_cap: 2000,
                default_aggregation: None,
            },
        }
    }
}

impl FromStr for PerformanceProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(PerformanceProfile::Minimal),
            "balanced" => Ok(PerformanceProfile::Balanced),
            "high_performance" => Ok(PerformanceProfile::HighPerformance),
            "real_time" => Ok(PerformanceProfile::RealTime),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

/// Flush scheduler settings
#[derive(Debug, Clone, PartialEq)]
pub struct FlushConfig {
    pub strategy: BufferStrategy,
    pub batch_interval: Duration,
    pub max_batch_size: usize,
    pub hard_cap: usize,
    pub priority_immediate: bool,
    pub adaptive_min_interval: Duration,
    pub adaptive_max_interval: Duration,
    /// Trailing window for arrival-rate estimation
    pub adaptive_rate_window: Duration,
    /// Period of the scheduler's trigger evaluation
    pub check_interval: Duration,
    pub send_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            strategy: BufferStrategy::Hybrid,
            batch_interval: Duration::from_secs(300),
            max_batch_size: 100,
            hard_cap: DEFAULT_HARD_CAP,
            priority_immediate: true,
            adaptive_min_interval: Duration::from_secs(60),
            adaptive_max_interval: Duration::from_secs(600),
            adaptive_rate_window: Duration::from_secs(120),
            check_interval: Duration::from_secs(1),
            send_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Fully resolved bridge configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeConfig {
    pub flush: FlushConfig,
    pub validator: ValidatorConfig,
}

/// Settings of a single signal
#[derive(Debug, Clone, PartialEq)]
pub struct PerSignalConfig {
    /// Overrides the classifier when set
    pub priority: Option<Priority>,
    pub aggregation: AggregationConfig,
    /// Upper bound on how long this signal's points may wait in the buffer
    pub transmission_interval: Option<Duration>,
    /// `Priority` requests an immediate flush of this signal's tier
    pub buffer_strategy: Option<BufferStrategy>,
    pub enabled: bool,
}

impl Default for PerSignalConfig {
    fn default() -> Self {
        Self {
            priority: None,
            aggregation: AggregationConfig::default(),
            transmission_interval: None,
            buffer_strategy: None,
            enabled: true,
        }
    }
}

/// Source of per-signal configuration, consulted on every ingest
pub trait ConfigProvider: Send + Sync {
    fn get(&self, signal_id: &str) -> PerSignalConfig;
}

/// In-memory provider with runtime updates
#[derive(Debug, Default)]
pub struct StaticConfigProvider {
    signals: DashMap<String, PerSignalConfig>,
    fallback: PerSignalConfig,
}

impl StaticConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: PerSignalConfig) -> Self {
        Self {
            signals: DashMap::new(),
            fallback,
        }
    }

    /// Install or replace a signal's config. Invalid aggregation settings
    /// fall back to passthrough.
    pub fn set(&self, signal_id: impl Into<String>, mut config: PerSignalConfig) {
        let signal_id = signal_id.into();
        if let Err(e) = config.aggregation.validate() {
            warn!(signal_id = %signal_id, error = %e, "Invalid aggregation config, using none");
            config.aggregation = AggregationConfig::passthrough();
        }
        self.signals.insert(signal_id, config);
    }

    pub fn remove(&self, signal_id: &str) -> Option<PerSignalConfig> {
        self.signals.remove(signal_id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get(&self, signal_id: &str) -> PerSignalConfig {
        self.signals
            .get(signal_id)
            .map(|c| c.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Raw settings of one signal as found in config files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    pub priority: Option<String>,
    pub aggregation_method: Option<String>,
    pub aggregation_window_secs: Option<i64>,
    pub min_change_threshold: Option<f64>,
    pub min_change_absolute: Option<f64>,
    pub transmission_interval_secs: Option<u64>,
    pub buffer_strategy: Option<String>,
    pub enabled: Option<bool>,
}

impl SignalSettings {
    fn resolve(&self, name: &str, default_aggregation: Option<&AggregationConfig>) -> Result<PerSignalConfig, ConfigError> {
        let priority = self.priority.as_deref().map(str::parse).transpose()?;
        let buffer_strategy = self.buffer_strategy.as_deref().map(str::parse).transpose()?;

        let aggregation = match self.aggregation_method.as_deref() {
            Some(method) => {
                let method: AggregationMethod = method.parse()?;
                let window_secs = self.aggregation_window_secs.unwrap_or(300);
                let candidate = AggregationConfig {
                    method,
                    window: Duration::from_secs(window_secs.max(0) as u64),
                    min_change_threshold: self.min_change_threshold,
                    min_change_absolute: self.min_change_absolute,
                };
                match (window_secs, candidate.validate()) {
                    (w, _) if w <= 0 && method.is_windowed() => {
                        warn!(signal_id = %name, window_secs = w, "Non-positive aggregation window, using none");
                        AggregationConfig::passthrough()
                    }
                    (_, Err(e)) => {
                        warn!(signal_id = %name, error = %e, "Invalid aggregation config, using none");
                        AggregationConfig::passthrough()
                    }
                    (_, Ok(())) => candidate,
                }
            }
            None => default_aggregation.cloned().unwrap_or_default(),
        };

        Ok(PerSignalConfig {
            priority,
            aggregation,
            transmission_interval: self
                .transmission_interval_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            buffer_strategy,
            enabled: self.enabled.unwrap_or(true),
        })
    }
}

/// Raw bridge settings as loaded from file and environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub profile: Option<String>,
    pub buffer_strategy: Option<String>,
    pub batch_interval_secs: Option<u64>,
    pub max_batch_size: Option<usize>,
    pub buffer_hard_cap: Option<usize>,
    pub priority_immediate: bool,
    pub adaptive_min_interval_secs: u64,
    pub adaptive_max_interval_secs: u64,
    pub adaptive_rate_window_secs: u64,
    pub check_interval_ms: u64,
    pub send_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub stale_threshold_minutes: u64,
    pub validate_ranges: bool,
    pub signals: HashMap<String, SignalSettings>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        let flush = FlushConfig::default();
        Self {
            profile: None,
            buffer_strategy: None,
            batch_interval_secs: None,
            max_batch_size: None,
            buffer_hard_cap: None,
            priority_immediate: flush.priority_immediate,
            adaptive_min_interval_secs: flush.adaptive_min_interval.as_secs(),
            adaptive_max_interval_secs: flush.adaptive_max_interval.as_secs(),
            adaptive_rate_window_secs: flush.adaptive_rate_window.as_secs(),
            check_interval_ms: flush.check_interval.as_millis() as u64,
            send_timeout_secs: flush.send_timeout.as_secs(),
            shutdown_timeout_secs: flush.shutdown_timeout.as_secs(),
            stale_threshold_minutes: 0,
            validate_ranges: true,
            signals: HashMap::new(),
        }
    }
}

impl BridgeSettings {
    /// Parse every name and number once. Explicit settings win over the profile.
    pub fn resolve(&self) -> Result<(BridgeConfig, StaticConfigProvider), ConfigError> {
        let profile = self
            .profile
            .as_deref()
            .map(str::parse::<PerformanceProfile>)
            .transpose()?
            .map(|p| p.defaults());

        let base = FlushConfig::default();
        let strategy = match self.buffer_strategy.as_deref() {
            Some(s) => s.parse()?,
            None => profile.as_ref().map(|p| p.strategy).unwrap_or(base.strategy),
        };
        let batch_interval = self
            .batch_interval_secs
            .map(Duration::from_secs)
            .or_else(|| profile.as_ref().map(|p| p.batch_interval))
            .unwrap_or(base.batch_interval);
        let max_batch_size = self
            .max_batch_size
            .or_else(|| profile.as_ref().map(|p| p.max_batch_size))
            .unwrap_or(base.max_batch_size);

        let hard_cap = self
            .buffer_hard_cap
            .or_else(|| profile.as_ref().map(|p| p.hard_cap))
            .unwrap_or(base.hard_cap);

        if max_batch_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "max_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if batch_interval.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "batch_interval_secs",
                reason: "must be positive".to_string(),
            });
        }
        if hard_cap < max_batch_size {
            return Err(ConfigError::InvalidSetting {
                name: "buffer_hard_cap",
                reason: format!("must be at least max_batch_size ({})", max_batch_size),
            });
        }
        if self.adaptive_min_interval_secs > self.adaptive_max_interval_secs {
            return Err(ConfigError::InvalidSetting {
                name: "adaptive_min_interval_secs",
                reason: "must not exceed adaptive_max_interval_secs".to_string(),
            });
        }

        let flush = FlushConfig {
            strategy,
            batch_interval,
            max_batch_size,
            hard_cap,
            priority_immediate: self.priority_immediate,
            adaptive_min_interval: Duration::from_secs(self.adaptive_min_interval_secs),
            adaptive_max_interval: Duration::from_secs(self.adaptive_max_interval_secs),
            adaptive_rate_window: Duration::from_secs(self.adaptive_rate_window_secs.max(1)),
            check_interval: Duration::from_millis(self.check_interval_ms.max(10)),
            send_timeout: Duration::from_secs(self.send_timeout_secs.max(1)),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        };

        let validator = ValidatorConfig {
            stale_threshold: Duration::from_secs(self.stale_threshold_minutes * 60),
            validate_ranges: self.validate_ranges,
        };

        let default_aggregation = profile.as_ref().and_then(|p| p.default_aggregation.clone());
        let provider = StaticConfigProvider::with_fallback(PerSignalConfig {
            aggregation: default_aggregation.clone().unwrap_or_default(),
            ..Default::default()
        });
        for (signal_id, settings) in &self.signals {
            provider.set(signal_id.clone(), settings.resolve(signal_id, default_aggregation.as_ref())?);
        }

        Ok((BridgeConfig { flush, validator }, provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_resolve() {
        let (config, provider) = assert_ok!(BridgeSettings::default().resolve());
        assert_eq!(config.flush, FlushConfig::default());
        assert!(provider.is_empty());
        assert_eq!(provider.get("sensor.anything"), PerSignalConfig::default());
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!("Hybrid".parse::<BufferStrategy>().unwrap(), BufferStrategy::Hybrid);
        assert_eq!("adaptive".parse::<BufferStrategy>().unwrap(), BufferStrategy::Adaptive);
        assert_err!("burst".parse::<BufferStrategy>());
    }

    #[test]
    fn test_unknown_names_fail_fast() {
        let mut settings = BridgeSettings {
            buffer_strategy: Some("eventually".to_string()),
            ..Default::default()
        };
        assert_eq!(
            settings.resolve().unwrap_err(),
            ConfigError::UnknownBufferStrategy("eventually".to_string())
        );

        settings.buffer_strategy = None;
        settings.signals.insert(
            "sensor.a".to_string(),
            SignalSettings {
                aggregation_method: Some("mode".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::UnknownAggregationMethod(_))
        ));
    }

    #[test]
    fn test_non_positive_window_falls_back_to_none() {
        let mut settings = BridgeSettings::default();
        settings.signals.insert(
            "sensor.a".to_string(),
            SignalSettings {
                aggregation_method: Some("average".to_string()),
                aggregation_window_secs: Some(-5),
                ..Default::default()
            },
        );
        let (_, provider) = assert_ok!(settings.resolve());
        assert_eq!(provider.get("sensor.a").aggregation.method, AggregationMethod::None);
    }

    #[test]
    fn test_profile_supplies_defaults_explicit_wins() {
        let settings = BridgeSettings {
            profile: Some("real_time".to_string()),
            max_batch_size: Some(250),
            ..Default::default()
        };
        let (config, _) = assert_ok!(settings.resolve());
        assert_eq!(config.flush.batch_interval, Duration::from_secs(30));
        assert_eq!(config.flush.strategy, BufferStrategy::Priority);
        assert_eq!(config.flush.max_batch_size, 250);
        assert_eq!(config.flush.hard_cap, 2000);
    }

    #[test]
    fn test_minimal_profile_aggregates_by_default() {
        let settings = BridgeSettings {
            profile: Some("minimal".to_string()),
            ..Default::default()
        };
        let (_, provider) = assert_ok!(settings.resolve());
        let cfg = provider.get("sensor.unconfigured");
        assert_eq!(cfg.aggregation.method, AggregationMethod::Average);
        assert_eq!(cfg.aggregation.window, Duration::from_secs(600));
    }

    #[test]
    fn test_signal_settings_resolve() {
        let mut settings = BridgeSettings::default();
        settings.signals.insert(
            "sensor.door".to_string(),
            SignalSettings {
                priority: Some("HIGH".to_string()),
                aggregation_method: Some("change_only".to_string()),
                min_change_threshold: Some(0.05),
                transmission_interval_secs: Some(15),
                buffer_strategy: Some("priority".to_string()),
                enabled: Some(true),
                ..Default::default()
            },
        );
        let (_, provider) = assert_ok!(settings.resolve());
        let cfg = provider.get("sensor.door");
        assert_eq!(cfg.priority, Some(Priority::High));
        assert_eq!(cfg.aggregation.method, AggregationMethod::ChangeOnly);
        assert_eq!(cfg.aggregation.min_change_threshold, Some(0.05));
        assert_eq!(cfg.transmission_interval, Some(Duration::from_secs(15)));
        assert_eq!(cfg.buffer_strategy, Some(BufferStrategy::Priority));
    }

    #[test]
    fn test_hard_cap_below_batch_size_rejected() {
        let settings = BridgeSettings {
            buffer_hard_cap: Some(10),
            max_batch_size: Some(50),
            ..Default::default()
        };
        assert!(matches!(
            settings.resolve(),
            Err(ConfigError::InvalidSetting { name: "buffer_hard_cap", .. })
        ));
    }

    #[test]
    fn test_provider_runtime_update() {
        let provider = StaticConfigProvider::new();
        provider.set(
            "sensor.a",
            PerSignalConfig {
                enabled: false,
                ..Default::default()
            },
        );
        assert!(!provider.get("sensor.a").enabled);
        provider.set("sensor.a", PerSignalConfig::default());
        assert!(provider.get("sensor.a").enabled);

        provider.set(
            "sensor.b",
            PerSignalConfig {
                aggregation: AggregationConfig::windowed(AggregationMethod::Sum, Duration::ZERO),
                ..Default::default()
            },
        );
        assert_eq!(provider.get("sensor.b").aggregation.method, AggregationMethod::None);
    }
}
