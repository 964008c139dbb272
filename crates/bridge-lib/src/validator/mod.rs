//! Validation and normalization of raw observations
//!
//! Turns a [`RawObservation`] into a finite, in-range [`NormalizedPoint`]
//! or a [`RejectionReason`]. Checks run in a fixed order:
//! - sentinel states (`unavailable`, `unknown`, `none`, empty, null)
//! - staleness against the observed timestamp
//! - boolean token mapping, then numeric parsing
//! - NaN/infinity
//! - unit normalization to the device class' canonical unit
//! - range table for the device class

mod units;

pub use units::{boolean_token, infer_device_class, is_invalid_state, range_for, to_canonical};

use crate::models::{NormalizedPoint, Origin, RawObservation, RawValue};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Why an observation was dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectionReason {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("cannot convert to numeric: {0}")]
    InvalidType(String),

    #[error("value {value} outside valid range [{min}, {max}] for {device_class}")]
    InvalidRange {
        device_class: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("observation is stale ({age_secs}s old, threshold {threshold_secs}s)")]
    Stale { age_secs: i64, threshold_secs: u64 },
}

impl RejectionReason {
    /// Stable label used in metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            RejectionReason::InvalidState(_) => "invalid_state",
            RejectionReason::InvalidType(_) => "invalid_type",
            RejectionReason::InvalidRange { .. } => "invalid_range",
            RejectionReason::Stale { .. } => "stale",
        }
    }

    pub const LABELS: [&'static str; 4] = ["invalid_state", "invalid_type", "invalid_range", "stale"];
}

/// Validator settings
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// Maximum observation age; zero disables the check
    pub stale_threshold: Duration,
    /// Whether to apply the device class range table
    pub validate_ranges: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::ZERO,
            validate_ranges: true,
        }
    }
}

/// Validate a single observation against `now`.
///
/// The returned point carries `Priority::Low`; classification happens later.
pub fn validate(
    obs: &RawObservation,
    config: &ValidatorConfig,
    now: DateTime<Utc>,
) -> Result<NormalizedPoint, RejectionReason> {
    if let RawValue::Null = obs.value {
        return Err(RejectionReason::InvalidState("null".to_string()));
    }
    if let RawValue::Text(s) = &obs.value {
        if is_invalid_state(s) {
            return Err(RejectionReason::InvalidState(s.clone()));
        }
    }

    if !config.stale_threshold.is_zero() {
        let age = now.signed_duration_since(obs.observed_at);
        let stale = age
            .to_std()
            .map(|age| age > config.stale_threshold)
            .unwrap_or(false);
        if stale {
            return Err(RejectionReason::Stale {
                age_secs: age.num_seconds(),
                threshold_secs: config.stale_threshold.as_secs(),
            });
        }
    }

    let (value, origin) = to_numeric(&obs.value)?;

    if !value.is_finite() {
        return Err(RejectionReason::InvalidType(format!(
            "non-finite value {}",
            value
        )));
    }

    let device_class = obs
        .device_class
        .clone()
        .or_else(|| infer_device_class(&obs.signal_id).map(str::to_string));

    let mut value = value;
    let mut unit = obs.unit.clone();
    if origin == Origin::Direct {
        if let (Some(class), Some(from)) = (device_class.as_deref(), obs.unit.as_deref()) {
            if let Some((converted, canonical)) = to_canonical(class, from, value) {
                value = converted;
                unit = Some(canonical.to_string());
            }
        }
    }

    if config.validate_ranges {
        if let Some(class) = device_class.as_deref() {
            if let Some((min, max)) = range_for(class) {
                if value < min || value > max {
                    return Err(RejectionReason::InvalidRange {
                        device_class: class.to_string(),
                        value,
                        min,
                        max,
                    });
                }
            }
        }
    }

    let mut point = NormalizedPoint::new(obs.signal_id.clone(), value, obs.observed_at);
    point.origin = origin;
    point.device_class = device_class;
    point.unit = unit;
    Ok(point)
}

fn to_numeric(raw: &RawValue) -> Result<(f64, Origin), RejectionReason> {
    match raw {
        RawValue::Bool(b) => Ok((if *b { 1.0 } else { 0.0 }, Origin::ConvertedBoolean)),
        RawValue::Number(n) => Ok((*n, Origin::Direct)),
        RawValue::Text(s) => {
            if let Some(v) = boolean_token(s) {
                return Ok((v, Origin::ConvertedBoolean));
            }
            s.trim()
                .parse::<f64>()
                .map(|v| (v, Origin::Direct))
                .map_err(|_| RejectionReason::InvalidType(format!("{:?}", s)))
        }
        RawValue::Null => Err(RejectionReason::InvalidState("null".to_string())),
    }
}

/// Validator bound to a configuration, using the wall clock
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn validate(&self, obs: &RawObservation) -> Result<NormalizedPoint, RejectionReason> {
        validate(obs, &self.config, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn cfg() -> ValidatorConfig {
        ValidatorConfig::default()
    }

    fn check(obs: RawObservation) -> Result<NormalizedPoint, RejectionReason> {
        validate(&obs, &cfg(), Utc::now())
    }

    #[test]
    fn test_boolean_tokens_map_to_zero_or_one() {
        for (token, expected) in [
            ("on", 1.0),
            ("off", 0.0),
            ("home", 1.0),
            ("not_home", 0.0),
            ("open", 1.0),
            ("closed", 0.0),
            ("locked", 1.0),
            ("unlocked", 0.0),
            ("true", 1.0),
            ("false", 0.0),
            ("yes", 1.0),
            ("no", 0.0),
            ("detected", 1.0),
            ("clear", 0.0),
        ] {
            let p = check(RawObservation::new("binary_sensor.door", token)).unwrap();
            assert_eq!(p.value, expected, "token {}", token);
            assert_eq!(p.origin, Origin::ConvertedBoolean);
        }
    }

    #[test]
    fn test_numeric_zero_one_unchanged() {
        for v in [0.0, 1.0] {
            let p = check(RawObservation::new("switch.fan", v)).unwrap();
            assert_eq!(p.value, v);
            assert_eq!(p.origin, Origin::Direct);
        }
        let p = check(RawObservation::new("switch.fan", "1")).unwrap();
        assert_eq!(p.value, 1.0);
    }

    #[test]
    fn test_native_booleans() {
        let p = check(RawObservation::new("switch.fan", true)).unwrap();
        assert_eq!(p.value, 1.0);
        assert_eq!(p.origin, Origin::ConvertedBoolean);
    }

    #[test]
    fn test_sentinel_states_rejected() {
        for s in ["unavailable", "UNKNOWN", "None", "none", ""] {
            let err = check(RawObservation::new("sensor.x", s)).unwrap_err();
            assert_eq!(err.label(), "invalid_state", "state {:?}", s);
        }
        let err = check(RawObservation::new("sensor.x", RawValue::Null)).unwrap_err();
        assert_eq!(err.label(), "invalid_state");
    }

    #[test]
    fn test_unrecognized_text_is_invalid_type() {
        let err = check(RawObservation::new("sensor.mode", "heating")).unwrap_err();
        assert_eq!(err.label(), "invalid_type");
    }

    #[test]
    fn test_non_finite_rejected() {
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = check(RawObservation::new("sensor.x", v)).unwrap_err();
            assert_eq!(err.label(), "invalid_type");
        }
        let err = check(RawObservation::new("sensor.x", "NaN")).unwrap_err();
        assert_eq!(err.label(), "invalid_type");
        let err = check(RawObservation::new("sensor.x", "inf")).unwrap_err();
        assert_eq!(err.label(), "invalid_type");
    }

    #[test]
    fn test_range_rejects_not_clamps() {
        let err = check(RawObservation::new("sensor.h", 120.0).device_class("humidity")).unwrap_err();
        assert!(matches!(err, RejectionReason::InvalidRange { .. }));

        let p = check(RawObservation::new("sensor.h", 100.0).device_class("humidity")).unwrap();
        assert_eq!(p.value, 100.0);
    }

    #[test]
    fn test_range_check_can_be_disabled() {
        let config = ValidatorConfig {
            validate_ranges: false,
            ..Default::default()
        };
        let obs = RawObservation::new("sensor.h", 120.0).device_class("humidity");
        assert!(validate(&obs, &config, Utc::now()).is_ok());
    }

    #[test]
    fn test_unit_normalized_before_range_check() {
        // 300 °F is 148.9 °C, inside the temperature range
        let p = check(
            RawObservation::new("sensor.oven", 300.0)
                .device_class("temperature")
                .unit("°F"),
        )
        .unwrap();
        assert!((p.value - 148.888_888).abs() < 1e-3);
        assert_eq!(p.unit.as_deref(), Some("°C"));

        // 60 kW is 60000 W, outside the power range
        let err = check(RawObservation::new("sensor.grid", 60.0).device_class("power").unit("kW"))
            .unwrap_err();
        assert_eq!(err.label(), "invalid_range");
    }

    #[test]
    fn test_unknown_unit_passes_through() {
        let p = check(RawObservation::new("sensor.wind", 12.0).unit("knots")).unwrap();
        assert_eq!(p.value, 12.0);
        assert_eq!(p.unit.as_deref(), Some("knots"));
    }

    #[test]
    fn test_device_class_inferred_from_signal_id() {
        let p = check(RawObservation::new("sensor.attic_temp", 20.0)).unwrap();
        assert_eq!(p.device_class.as_deref(), Some("temperature"));

        let err = check(RawObservation::new("sensor.attic_temp", 500.0)).unwrap_err();
        assert_eq!(err.label(), "invalid_range");
    }

    #[test]
    fn test_staleness_threshold() {
        let now = Utc::now();
        let obs = RawObservation::new("sensor.t", 20.0).observed_at(now - ChronoDuration::minutes(10));

        let five_minutes = ValidatorConfig {
            stale_threshold: Duration::from_secs(5 * 60),
            ..Default::default()
        };
        let err = validate(&obs, &five_minutes, now).unwrap_err();
        assert_eq!(err.label(), "stale");

        let disabled = ValidatorConfig {
            stale_threshold: Duration::ZERO,
            ..Default::default()
        };
        assert!(validate(&obs, &disabled, now).is_ok());
    }

    #[test]
    fn test_future_timestamp_not_stale() {
        let now = Utc::now();
        let obs = RawObservation::new("sensor.t", 20.0).observed_at(now + ChronoDuration::minutes(1));
        let config = ValidatorConfig {
            stale_threshold: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(validate(&obs, &config, now).is_ok());
    }

    #[test]
    fn test_emitted_values_within_range() {
        let samples = [-150.0, -100.0, 0.0, 25.0, 200.0, 250.0];
        for v in samples {
            if let Ok(p) = check(RawObservation::new("sensor.t", v).device_class("temperature")) {
                let (lo, hi) = range_for("temperature").unwrap();
                assert!(p.value.is_finite());
                assert!(lo <= p.value && p.value <= hi);
            }
        }
    }
}
