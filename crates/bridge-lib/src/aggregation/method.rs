//! Aggregation methods and per-signal aggregation settings

use crate::error::{AggregationError, ConfigError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    #[default]
    None,
    Average,
    Median,
    Min,
    Max,
    Sum,
    First,
    Last,
    Count,
    ChangeOnly,
}

impl AggregationMethod {
    pub const ALL: [AggregationMethod; 10] = [
        AggregationMethod::None,
        AggregationMethod::Average,
        AggregationMethod::Median,
        AggregationMethod::Min,
        AggregationMethod::Max,
        AggregationMethod::Sum,
        AggregationMethod::First,
        AggregationMethod::Last,
        AggregationMethod::Count,
        AggregationMethod::ChangeOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::None => "none",
            AggregationMethod::Average => "average",
            AggregationMethod::Median => "median",
            AggregationMethod::Min => "min",
            AggregationMethod::Max => "max",
            AggregationMethod::Sum => "sum",
            AggregationMethod::First => "first",
            AggregationMethod::Last => "last",
            AggregationMethod::Count => "count",
            AggregationMethod::ChangeOnly => "change_only",
        }
    }

    /// Methods that reduce a time window to one point
    pub fn is_windowed(&self) -> bool {
        !matches!(self, AggregationMethod::None | AggregationMethod::ChangeOnly)
    }

    pub(crate) fn index(&self) -> usize {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0)
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        AggregationMethod::ALL
            .iter()
            .find(|m| m.as_str() == normalized)
            .copied()
            .ok_or_else(|| ConfigError::UnknownAggregationMethod(s.to_string()))
    }
}

/// Aggregation settings of one signal
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
    pub method: AggregationMethod,
    pub window: Duration,
    /// Relative change needed to emit under `change_only`
    pub min_change_threshold: Option<f64>,
    /// Absolute change that always emits under `change_only`
    pub min_change_absolute: Option<f64>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            method: AggregationMethod::None,
            window: Duration::from_secs(300),
            min_change_threshold: None,
            min_change_absolute: None,
        }
    }
}

impl AggregationConfig {
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn windowed(method: AggregationMethod, window: Duration) -> Self {
        Self {
            method,
            window,
            ..Default::default()
        }
    }

    pub fn change_only(relative: Option<f64>, absolute: Option<f64>) -> Self {
        Self {
            method: AggregationMethod::ChangeOnly,
            min_change_threshold: relative,
            min_change_absolute: absolute,
            ..Default::default()
        }
    }

    /// Check the settings can be applied at ingest time
    pub fn validate(&self) -> Result<(), AggregationError> {
        if self.method.is_windowed() && self.window.is_zero() {
            return Err(AggregationError::NonPositiveWindow {
                method: self.method.to_string(),
            });
        }
        for t in [self.min_change_threshold, self.min_change_absolute]
            .into_iter()
            .flatten()
        {
            if t < 0.0 || !t.is_finite() {
                return Err(AggregationError::NegativeThreshold(t));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_methods() {
        assert_eq!("average".parse::<AggregationMethod>().unwrap(), AggregationMethod::Average);
        assert_eq!("CHANGE_ONLY".parse::<AggregationMethod>().unwrap(), AggregationMethod::ChangeOnly);
        assert!(matches!(
            "mean".parse::<AggregationMethod>(),
            Err(ConfigError::UnknownAggregationMethod(_))
        ));
    }

    #[test]
    fn test_zero_window_rejected_for_windowed_methods() {
        let cfg = AggregationConfig::windowed(AggregationMethod::Average, Duration::ZERO);
        assert!(cfg.validate().is_err());

        let cfg = AggregationConfig {
            window: Duration::ZERO,
            ..AggregationConfig::change_only(Some(0.1), None)
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let cfg = AggregationConfig::change_only(Some(-0.5), None);
        assert_eq!(cfg.validate(), Err(AggregationError::NegativeThreshold(-0.5)));
    }
}
