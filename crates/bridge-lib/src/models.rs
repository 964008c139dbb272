//! Core data models for the sensor bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Flush-latency class of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// All tiers in drain order
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a point came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Numeric value taken as reported
    Direct,
    /// Produced by closing an aggregation window
    Aggregated,
    /// Mapped from a boolean-like token
    ConvertedBoolean,
}

/// Raw reported value, before validation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
    Text(String),
    #[default]
    Null,
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Number(n) => write!(f, "{}", n),
            RawValue::Text(s) => write!(f, "{:?}", s),
            RawValue::Null => f.write_str("null"),
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

/// A single state change reported by an event source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    pub signal_id: String,
    #[serde(default)]
    pub value: RawValue,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl RawObservation {
    pub fn new(signal_id: impl Into<String>, value: impl Into<RawValue>) -> Self {
        Self {
            signal_id: signal_id.into(),
            value: value.into(),
            observed_at: Utc::now(),
            device_class: None,
            unit: None,
        }
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    pub fn device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = Some(device_class.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// A validated, finite, in-range time-series point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPoint {
    pub signal_id: String,
    pub value: f64,
    /// Wall-clock time the value refers to
    pub timestamp: DateTime<Utc>,
    /// Monotonic instant the point entered the pipeline
    #[serde(skip)]
    pub received_at: Instant,
    pub priority: Priority,
    pub origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl NormalizedPoint {
    /// Build a direct point stamped now. Priority defaults to `Low` until classified.
    pub fn new(signal_id: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            signal_id: signal_id.into(),
            value,
            timestamp,
            received_at: Instant::now(),
            priority: Priority::Low,
            origin: Origin::Direct,
            device_class: None,
            unit: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_boolean_domain(&self) -> bool {
        self.origin == Origin::ConvertedBoolean
    }
}
