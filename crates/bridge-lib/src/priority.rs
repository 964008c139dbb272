//! Static priority classification of signals

use crate::models::Priority;
use crate::validator::infer_device_class;

const HIGH_CLASSES: &[&str] = &[
    "energy",
    "power",
    "temperature",
    "carbon_dioxide",
    "co2",
    "carbon_monoxide",
    "aqi",
    "pm25",
    "pm10",
    "volatile_organic_compounds",
    "voc",
];

const MEDIUM_CLASSES: &[&str] = &[
    "illuminance",
    "motion",
    "occupancy",
    "presence",
    "speed",
    "wind_speed",
    "humidity",
    "moisture",
    "pressure",
];

/// Maps a signal to its flush priority.
///
/// Explicit per-signal overrides are resolved by the caller before this
/// table is consulted; see [`PriorityClassifier::classify_with_override`].
#[derive(Debug, Clone, Default)]
pub struct PriorityClassifier;

impl PriorityClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, signal_id: &str, device_class: Option<&str>) -> Priority {
        // Binary sensors are state flags, never latency critical
        if domain(signal_id) == "binary_sensor" {
            return Priority::Low;
        }

        let class = device_class.or_else(|| infer_device_class(signal_id));
        let Some(class) = class else {
            return Priority::Low;
        };
        let class = class.to_ascii_lowercase();

        if HIGH_CLASSES.contains(&class.as_str()) {
            Priority::High
        } else if MEDIUM_CLASSES.contains(&class.as_str()) {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    pub fn classify_with_override(
        &self,
        signal_id: &str,
        device_class: Option<&str>,
        configured: Option<Priority>,
    ) -> Priority {
        configured.unwrap_or_else(|| self.classify(signal_id, device_class))
    }
}

fn domain(signal_id: &str) -> &str {
    signal_id.split('.').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_classes() {
        let c = PriorityClassifier::new();
        assert_eq!(c.classify("sensor.grid", Some("power")), Priority::High);
        assert_eq!(c.classify("sensor.meter", Some("energy")), Priority::High);
        assert_eq!(c.classify("sensor.office", Some("carbon_dioxide")), Priority::High);
        assert_eq!(c.classify("sensor.outdoor", Some("pm25")), Priority::High);
    }

    #[test]
    fn test_medium_classes() {
        let c = PriorityClassifier::new();
        assert_eq!(c.classify("sensor.lux", Some("illuminance")), Priority::Medium);
        assert_eq!(c.classify("sensor.bath", Some("humidity")), Priority::Medium);
        assert_eq!(c.classify("sensor.wind", Some("wind_speed")), Priority::Medium);
    }

    #[test]
    fn test_binary_sensor_is_low() {
        let c = PriorityClassifier::new();
        assert_eq!(c.classify("binary_sensor.hall_motion", Some("motion")), Priority::Low);
        assert_eq!(c.classify("binary_sensor.smoke", None), Priority::Low);
    }

    #[test]
    fn test_unknown_is_low() {
        let c = PriorityClassifier::new();
        assert_eq!(c.classify("sensor.uptime", None), Priority::Low);
        assert_eq!(c.classify("sensor.signal", Some("signal_strength")), Priority::Low);
    }

    #[test]
    fn test_inferred_from_signal_id() {
        let c = PriorityClassifier::new();
        assert_eq!(c.classify("sensor.kitchen_temperature", None), Priority::High);
        assert_eq!(c.classify("sensor.bathroom_humidity", None), Priority::Medium);
    }

    #[test]
    fn test_override_always_wins() {
        let c = PriorityClassifier::new();
        assert_eq!(
            c.classify_with_override("sensor.grid", Some("power"), Some(Priority::Low)),
            Priority::Low
        );
        assert_eq!(
            c.classify_with_override("binary_sensor.door", None, Some(Priority::High)),
            Priority::High
        );
        assert_eq!(
            c.classify_with_override("sensor.grid", Some("power"), None),
            Priority::High
        );
    }
}
