//! Static conversion and range tables keyed by device class

/// Boolean-like tokens and their numeric value. Matched case-insensitively.
const BOOLEAN_TOKENS: &[(&str, f64)] = &[
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
    ("active", 1.0),
    ("inactive", 0.0),
    ("detected", 1.0),
    ("clear", 0.0),
];

/// States that never carry a value
const INVALID_STATES: &[&str] = &["unavailable", "unknown", "none", "null", ""];

/// Inclusive valid range per device class, in canonical units
const RANGES: &[(&str, f64, f64)] = &[
    ("temperature", -100.0, 200.0),
    ("humidity", 0.0, 100.0),
    ("pressure", 0.0, 2000.0),
    ("battery", 0.0, 100.0),
    ("brightness", 0.0, 255.0),
    ("volume_level", 0.0, 1.0),
    ("pm25", 0.0, 1000.0),
    ("pm10", 0.0, 1000.0),
    ("carbon_dioxide", 0.0, 10000.0),
    ("aqi", 0.0, 500.0),
    ("illuminance", 0.0, 200000.0),
    ("power", -50000.0, 50000.0),
    ("energy", 0.0, 1000000.0),
    ("voltage", 0.0, 500.0),
    ("current", 0.0, 100.0),
    ("power_factor", -1.0, 1.0),
];

/// Numeric value of a boolean-like token, if recognized
pub fn boolean_token(token: &str) -> Option<f64> {
    let token = token.trim();
    BOOLEAN_TOKENS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(token))
        .map(|(_, v)| *v)
}

pub fn is_invalid_state(token: &str) -> bool {
    let token = token.trim();
    INVALID_STATES.iter().any(|s| s.eq_ignore_ascii_case(token))
}

/// Valid range for a device class, `None` when unbounded
pub fn range_for(device_class: &str) -> Option<(f64, f64)> {
    RANGES
        .iter()
        .find(|(class, _, _)| *class == device_class)
        .map(|(_, lo, hi)| (*lo, *hi))
}

/// Convert `value` from `unit` into the canonical unit of `device_class`.
///
/// Returns the converted value and the canonical unit, or `None` when the
/// class or unit has no known conversion (the caller keeps the value as is).
pub fn to_canonical(device_class: &str, unit: &str, value: f64) -> Option<(f64, &'static str)> {
    let converted = match (device_class, unit) {
        ("temperature", "°C" | "C") => value,
        ("temperature", "°F" | "F") => (value - 32.0) * 5.0 / 9.0,
        ("temperature", "K") => value - 273.15,

        ("power", "W") => value,
        ("power", "kW") => value * 1000.0,
        ("power", "MW") => value * 1_000_000.0,

        ("energy", "kWh") => value,
        ("energy", "Wh") => value / 1000.0,
        ("energy", "MWh") => value * 1000.0,

        ("pressure", "hPa" | "mbar") => value,
        ("pressure", "Pa") => value / 100.0,
        ("pressure", "psi") => value * 68.9476,
        ("pressure", "inHg") => value * 33.8639,

        _ => return None,
    };

    let canonical = match device_class {
        "temperature" => "°C",
        "power" => "W",
        "energy" => "kWh",
        _ => "hPa",
    };

    Some((converted, canonical))
}

/// Guess a device class from a signal or attribute name
pub fn infer_device_class(name: &str) -> Option<&'static str> {
    let name = name.to_ascii_lowercase();
    // First match wins; "temp" before "current" so current_temperature is a temperature.
    const KEYWORDS: &[(&str, &str)] = &[
        ("temp", "temperature"),
        ("humid", "humidity"),
        ("power", "power"),
        ("energy", "energy"),
        ("voltage", "voltage"),
        ("current", "current"),
        ("battery", "battery"),
        ("brightness", "brightness"),
        ("volume", "volume_level"),
    ];

    KEYWORDS
        .iter()
        .find(|(kw, _)| name.contains(kw))
        .map(|(_, class)| *class)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_boolean_tokens_case_insensitive() {
        assert_eq!(boolean_token("ON"), Some(1.0));
        assert_eq!(boolean_token("Not_Home"), Some(0.0));
        assert_eq!(boolean_token("detected"), Some(1.0));
        assert_eq!(boolean_token("clear"), Some(0.0));
        assert_eq!(boolean_token("maybe"), None);
    }

    #[test]
    fn test_invalid_states() {
        assert!(is_invalid_state("Unavailable"));
        assert!(is_invalid_state("unknown"));
        assert!(is_invalid_state("None"));
        assert!(is_invalid_state(""));
        assert!(!is_invalid_state("on"));
    }

    #[test]
    fn test_temperature_conversion() {
        let (c, unit) = to_canonical("temperature", "°F", 212.0).unwrap();
        assert!(approx(c, 100.0));
        assert_eq!(unit, "°C");

        let (c, _) = to_canonical("temperature", "K", 273.15).unwrap();
        assert!(approx(c, 0.0));
    }

    #[test]
    fn test_power_energy_pressure_conversion() {
        assert!(approx(to_canonical("power", "kW", 1.5).unwrap().0, 1500.0));
        assert!(approx(to_canonical("energy", "Wh", 2500.0).unwrap().0, 2.5));
        assert!(approx(to_canonical("energy", "MWh", 1.0).unwrap().0, 1000.0));
        assert!(approx(to_canonical("pressure", "Pa", 101325.0).unwrap().0, 1013.25));
        assert!(approx(to_canonical("pressure", "psi", 1.0).unwrap().0, 68.9476));
        assert!(approx(to_canonical("pressure", "inHg", 1.0).unwrap().0, 33.8639));
    }

    #[test]
    fn test_unknown_unit_passes_through() {
        assert!(to_canonical("temperature", "°R", 500.0).is_none());
        assert!(to_canonical("humidity", "%", 50.0).is_none());
    }

    #[test]
    fn test_ranges() {
        assert_eq!(range_for("humidity"), Some((0.0, 100.0)));
        assert_eq!(range_for("energy"), Some((0.0, 1000000.0)));
        assert_eq!(range_for("speed"), None);
    }

    #[test]
    fn test_infer_device_class() {
        assert_eq!(infer_device_class("sensor.kitchen_temp"), Some("temperature"));
        assert_eq!(infer_device_class("climate.hall.current_temperature"), Some("temperature"));
        assert_eq!(infer_device_class("sensor.washer_power"), Some("power"));
        assert_eq!(infer_device_class("media_player.tv.volume_level"), Some("volume_level"));
        assert_eq!(infer_device_class("switch.porch"), None);
    }
}
