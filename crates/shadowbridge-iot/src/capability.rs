//! Capability translation between local characteristics and shadow keys.
//!
//! A characteristic becomes a capability when its type classifier belongs to
//! the recognized set below. Capabilities are keyed by their human-readable
//! description in both the shadow document and the delta messages; the
//! reverse iid -> name map built here is what routes events in both
//! directions.

use std::collections::HashMap;

use serde_json::Value;

use shadowbridge_core::hap::{HapCharacteristic, HapService};

/// Sentinel returned when a name lookup has no match at any level.
pub const UNKNOWN_VALUE: &str = "Unknown";

/// Device-type classifier when the service type is absent or unmapped.
pub const DEFAULT_DEVICE_TYPE: &str = "OTHER";

/// Service-type prefix (first 8 characters) -> device-type classifier.
const DEVICE_TYPES: &[(&str, &str)] = &[
    ("00000040", "FAN"),
    ("00000041", "GARAGE_DOOR"),
    ("00000043", "LIGHT"),
    ("00000045", "LOCK"),
    ("00000047", "OUTLET"),
    ("00000049", "SWITCH"),
    ("0000004A", "THERMOSTAT"),
    ("0000007E", "SECURITY_SYSTEM"),
    ("00000080", "CONTACT_SENSOR"),
    ("00000082", "HUMIDITY_SENSOR"),
    ("00000083", "LEAK_SENSOR"),
    ("00000084", "LIGHT_SENSOR"),
    ("00000085", "MOTION_SENSOR"),
    ("00000086", "OCCUPANCY_SENSOR"),
    ("00000087", "SMOKE_SENSOR"),
    ("0000008A", "TEMPERATURE_SENSOR"),
    ("0000008C", "WINDOW_COVERING"),
    ("000000B7", "FAN"),
    ("000000D0", "VALVE"),
];

/// Short characteristic-type codes of recognized capabilities.
const CAPABILITY_TYPES: &[&str] = &[
    "8",  // Brightness
    "E",  // Current Door State
    "F",  // Current Heating Cooling State
    "10", // Current Relative Humidity
    "11", // Current Temperature
    "13", // Hue
    "1D", // Lock Current State
    "1E", // Lock Target State
    "22", // Motion Detected
    "25", // On
    "29", // Rotation Speed
    "2F", // Saturation
    "32", // Target Door State
    "33", // Target Heating Cooling State
    "35", // Target Temperature
    "66", // Security System Current State
    "67", // Security System Target State
    "68", // Battery Level
    "6A", // Contact Sensor State
    "6B", // Current Ambient Light Level
    "6D", // Current Position
    "70", // Leak Detected
    "71", // Occupancy Detected
    "72", // Position State
    "76", // Smoke Detected
    "79", // Status Low Battery
    "7C", // Target Position
    "95", // Air Quality
    "B0", // Active
    "CE", // Color Temperature
];

/// Normalize a type classifier to its short spelling.
///
/// Dumps emit either the short form ("25") or the full UUID
/// ("00000025-0000-1000-8000-0026BB765291"); both collapse to "25".
fn short_type(char_type: &str) -> String {
    let head = char_type.split('-').next().unwrap_or(char_type);
    let trimmed = head.trim_start_matches('0');
    let short = if trimmed.is_empty() { "0" } else { trimmed };
    short.to_ascii_uppercase()
}

/// Whether a characteristic type belongs to the recognized capability set.
pub fn is_capability(char_type: &str) -> bool {
    CAPABILITY_TYPES.contains(&short_type(char_type).as_str())
}

/// Classify a service into a device type by its type prefix.
pub fn device_type(service_type: &str) -> &'static str {
    if let Some(prefix) = service_type.get(..8) {
        if let Some((_, classifier)) = DEVICE_TYPES
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(prefix))
        {
            return classifier;
        }
    }
    DEFAULT_DEVICE_TYPE
}

/// Description-keyed characteristic lookup for one service.
///
/// Characteristics without a description are simply unavailable for lookups;
/// that is not an error.
pub fn characteristic_map(service: &HapService) -> HashMap<String, &HapCharacteristic> {
    service
        .characteristics
        .iter()
        .filter_map(|c| c.description.as_ref().map(|d| (d.clone(), c)))
        .collect()
}

/// Resolve a named characteristic value, falling back to the accessory-info
/// map and then to the `"Unknown"` sentinel.
pub fn characteristic_value(
    service_map: &HashMap<String, &HapCharacteristic>,
    info_map: &HashMap<String, &HapCharacteristic>,
    name: &str,
) -> Value {
    service_map
        .get(name)
        .or_else(|| info_map.get(name))
        .map(|c| c.value.clone())
        .unwrap_or_else(|| Value::String(UNKNOWN_VALUE.to_string()))
}

/// Capability name -> current value, filtered to the recognized set.
pub fn capability_values(
    service_map: &HashMap<String, &HapCharacteristic>,
) -> HashMap<String, Value> {
    service_map
        .iter()
        .filter(|(_, c)| is_capability(&c.char_type))
        .map(|(name, c)| (name.clone(), c.value.clone()))
        .collect()
}

/// Characteristic instance id -> capability name, for event routing.
///
/// Only recognized capabilities are included, so an event on a bookkeeping
/// characteristic (e.g. `Name`) routes nowhere.
pub fn capability_sources(
    service_map: &HashMap<String, &HapCharacteristic>,
) -> HashMap<u64, String> {
    service_map
        .iter()
        .filter(|(_, c)| is_capability(&c.char_type))
        .filter_map(|(name, c)| c.iid.map(|iid| (iid, name.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn characteristic(
        iid: u64,
        char_type: &str,
        description: Option<&str>,
        value: Value,
    ) -> HapCharacteristic {
        HapCharacteristic {
            iid: Some(iid),
            char_type: char_type.to_string(),
            description: description.map(str::to_string),
            value,
        }
    }

    fn light_service() -> HapService {
        HapService {
            iid: Some(8),
            service_type: "00000043-0000-1000-8000-0026BB765291".to_string(),
            characteristics: vec![
                characteristic(9, "23", Some("Name"), json!("Kitchen Light")),
                characteristic(
                    10,
                    "00000025-0000-1000-8000-0026BB765291",
                    Some("On"),
                    json!(false),
                ),
                characteristic(11, "8", Some("Brightness"), json!(80)),
                characteristic(12, "25", None, json!(true)),
            ],
        }
    }

    #[test]
    fn test_short_type_normalization() {
        assert!(is_capability("25"));
        assert!(is_capability("00000025-0000-1000-8000-0026BB765291"));
        assert!(is_capability("0000008-0000-1000-8000-0026BB765291"));
        assert!(!is_capability("23"));
        assert!(!is_capability(""));
    }

    #[test]
    fn test_device_type_lookup_and_default() {
        assert_eq!(device_type("00000043-0000-1000-8000-0026BB765291"), "LIGHT");
        assert_eq!(device_type("00000049-0000-1000-8000-0026BB765291"), "SWITCH");
        assert_eq!(device_type("DEADBEEF-0000"), "OTHER");
        assert_eq!(device_type("43"), "OTHER");
    }

    #[test]
    fn test_characteristic_map_skips_undescribed() {
        let service = light_service();
        let map = characteristic_map(&service);
        assert_eq!(map.len(), 3);
        assert!(map.contains_key("On"));
        assert!(map.contains_key("Brightness"));
    }

    #[test]
    fn test_value_lookup_falls_back_to_info_then_unknown() {
        let service = light_service();
        let info_service = HapService {
            iid: Some(1),
            service_type: "0000003E".to_string(),
            characteristics: vec![characteristic(2, "20", Some("Manufacturer"), json!("Acme"))],
        };
        let service_map = characteristic_map(&service);
        let info_map = characteristic_map(&info_service);

        assert_eq!(
            characteristic_value(&service_map, &info_map, "Name"),
            json!("Kitchen Light")
        );
        assert_eq!(
            characteristic_value(&service_map, &info_map, "Manufacturer"),
            json!("Acme")
        );
        assert_eq!(
            characteristic_value(&service_map, &info_map, "Serial Number"),
            json!(UNKNOWN_VALUE)
        );
    }

    #[test]
    fn test_capability_values_filters_to_recognized_set() {
        let service = light_service();
        let values = capability_values(&characteristic_map(&service));
        assert_eq!(values.len(), 2);
        assert_eq!(values["On"], json!(false));
        assert_eq!(values["Brightness"], json!(80));
    }

    #[test]
    fn test_capability_sources_exclude_bookkeeping_characteristics() {
        let service = light_service();
        let sources = capability_sources(&characteristic_map(&service));
        assert_eq!(sources.len(), 2);
        assert_eq!(sources.get(&10).map(String::as_str), Some("On"));
        assert_eq!(sources.get(&11).map(String::as_str), Some("Brightness"));
        assert!(!sources.contains_key(&9));
    }
}
