//! Bridge configuration.
//!
//! Configuration is loaded from a JSON document and may be overridden by
//! environment variables (useful for keeping credentials out of the file).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable names recognized by [`BridgeConfig::apply_env`].
pub mod env_vars {
    pub const AWS_REGION: &str = "SHADOWBRIDGE_AWS_REGION";
    pub const ACCESS_KEY_ID: &str = "SHADOWBRIDGE_ACCESS_KEY_ID";
    pub const SECRET_ACCESS_KEY: &str = "SHADOWBRIDGE_SECRET_ACCESS_KEY";
    pub const IOT_ENDPOINT: &str = "SHADOWBRIDGE_IOT_ENDPOINT";
    pub const IOT_IDENTIFIER: &str = "SHADOWBRIDGE_IOT_IDENTIFIER";
    pub const PIN: &str = "SHADOWBRIDGE_PIN";
}

fn default_refresh_minutes() -> u64 {
    // One day, matching the accessory cache lifetime of typical bridges.
    1440
}

fn default_event_poll_secs() -> u64 {
    2
}

fn default_keep_alive_secs() -> u64 {
    30
}

/// One entry of the device filter list.
///
/// Only devices whose display name appears here (case-insensitively) are
/// synchronized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFilterEntry {
    /// Display name of the device.
    pub name: String,
    /// Category shown alongside the device in downstream consumers.
    #[serde(default)]
    pub display_category: String,
}

/// Address of one local accessory-network instance to bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HapInstanceConfig {
    /// Stable identifier of the bridge process.
    pub device_id: String,
    /// Display name of the bridge.
    #[serde(default)]
    pub name: String,
    /// Host the instance listens on.
    pub host: String,
    /// Port the instance listens on.
    pub port: u16,
}

/// Top-level configuration consumed by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// AWS region of the IoT registry.
    pub aws_region: String,
    /// IAM access key id.
    pub access_key_id: String,
    /// IAM secret access key.
    pub secret_access_key: String,
    /// Namespace for derived thing ids and the thing group.
    pub iot_identifier: String,
    /// ATS data endpoint host (also used for the websocket transport).
    pub iot_endpoint: String,
    /// Pairing pin sent to the local accessory network.
    #[serde(default)]
    pub pin: String,
    /// Devices eligible for synchronization.
    #[serde(default)]
    pub device_filter: Vec<DeviceFilterEntry>,
    /// Local instances to discover.
    #[serde(default)]
    pub instances: Vec<HapInstanceConfig>,
    /// Minutes between discovery passes.
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u64,
    /// Seconds between characteristic-change polls.
    #[serde(default = "default_event_poll_secs")]
    pub event_poll_secs: u64,
    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Verbose logging of signing and payloads.
    #[serde(default)]
    pub debug: bool,
}

impl BridgeConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::InvalidConfiguration(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;
        Ok(config)
    }

    /// Override credential-bearing fields from the environment.
    pub fn apply_env(&mut self) {
        let overrides = [
            (env_vars::AWS_REGION, &mut self.aws_region),
            (env_vars::ACCESS_KEY_ID, &mut self.access_key_id),
            (env_vars::SECRET_ACCESS_KEY, &mut self.secret_access_key),
            (env_vars::IOT_ENDPOINT, &mut self.iot_endpoint),
            (env_vars::IOT_IDENTIFIER, &mut self.iot_identifier),
            (env_vars::PIN, &mut self.pin),
        ];
        for (var, field) in overrides {
            if let Ok(value) = std::env::var(var) {
                *field = value;
            }
        }
    }

    /// Reject configurations that cannot possibly connect.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("aws_region", &self.aws_region),
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("iot_identifier", &self.iot_identifier),
            ("iot_endpoint", &self.iot_endpoint),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(Error::InvalidConfiguration(format!("{} is required", name)));
            }
        }
        Ok(())
    }

    /// The device filter set: lower-cased display name -> category.
    pub fn filter_set(&self) -> HashMap<String, String> {
        self.device_filter
            .iter()
            .map(|entry| (entry.name.to_lowercase(), entry.display_category.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BridgeConfig {
        serde_json::from_value(serde_json::json!({
            "aws_region": "us-east-1",
            "access_key_id": "AKIAEXAMPLE",
            "secret_access_key": "secret",
            "iot_identifier": "my-home",
            "iot_endpoint": "example-ats.iot.us-east-1.amazonaws.com",
            "device_filter": [
                {"name": "Kitchen Light", "display_category": "LIGHT"},
                {"name": "Front Door", "display_category": "DOOR"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = sample();
        assert_eq!(config.refresh_minutes, 1440);
        assert_eq!(config.event_poll_secs, 2);
        assert_eq!(config.keep_alive_secs, 30);
        assert!(!config.debug);
    }

    #[test]
    fn test_filter_set_is_lowercased() {
        let filter = sample().filter_set();
        assert_eq!(filter.get("kitchen light").map(String::as_str), Some("LIGHT"));
        assert_eq!(filter.get("front door").map(String::as_str), Some("DOOR"));
        assert!(!filter.contains_key("Kitchen Light"));
    }

    #[test]
    fn test_validate_rejects_missing_region() {
        let mut config = sample();
        config.aws_region.clear();
        assert!(config.validate().is_err());
        assert!(sample().validate().is_ok());
    }
}
