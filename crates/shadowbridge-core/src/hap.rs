//! Local accessory-network data model.
//!
//! These types mirror the JSON dump the accessory protocol emits for
//! `GET /accessories`: a bridge hosts accessories, an accessory groups
//! services, a service groups characteristics. Field names follow the wire
//! format (`aid`, `iid`, `type`, `ev`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A single typed state facet of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HapCharacteristic {
    /// Instance id, unique within the owning accessory.
    #[serde(default)]
    pub iid: Option<u64>,
    /// Type classifier (UUID, long or short spelling).
    #[serde(rename = "type", default)]
    pub char_type: String,
    /// Human-readable name; absent characteristics are excluded from
    /// name lookups.
    #[serde(default)]
    pub description: Option<String>,
    /// Last known value.
    #[serde(default)]
    pub value: Value,
}

/// A grouping of related characteristics on an accessory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HapService {
    #[serde(default)]
    pub iid: Option<u64>,
    /// Service type classifier.
    #[serde(rename = "type", default)]
    pub service_type: String,
    #[serde(default)]
    pub characteristics: Vec<HapCharacteristic>,
}

/// A discovered device exposing one or more services.
///
/// The first service carries the accessory information characteristics
/// (name, manufacturer, serial number, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HapAccessory {
    #[serde(default)]
    pub aid: Option<u64>,
    #[serde(default)]
    pub services: Vec<HapService>,
}

/// Wire wrapper around the accessory list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessoryDump {
    #[serde(default)]
    pub accessories: Vec<HapAccessory>,
}

/// One local bridge process and its enumerated accessories.
#[derive(Debug, Clone)]
pub struct HapBridge {
    /// Display name of the bridge.
    pub name: String,
    /// Stable identifier of the bridge process.
    pub device_id: String,
    /// Enumerated accessory graph.
    pub accessories: AccessoryDump,
}

/// A characteristic-change notification from the local network.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicEvent {
    /// Identifier of the bridge that emitted the event.
    pub device_id: String,
    pub aid: u64,
    pub iid: u64,
    pub value: Value,
    /// Whether the device reported the change as applied.
    pub status: bool,
}

/// A single local control write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDirective {
    pub aid: u64,
    pub iid: u64,
    pub value: Value,
}

/// A single event-notification registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRegistration {
    pub aid: u64,
    pub iid: u64,
    /// Enable notifications for this characteristic.
    pub ev: bool,
}

/// Control surface of the local accessory network.
///
/// Both calls are batched per bridge: one request carries every directive or
/// registration for that bridge.
#[async_trait]
pub trait HapController: Send + Sync {
    /// Apply a batch of characteristic writes on one bridge.
    async fn control(&self, device_id: &str, directives: &[ControlDirective]) -> Result<()>;

    /// Register for change notifications on a batch of characteristics.
    async fn register_events(
        &self,
        device_id: &str,
        registrations: &[EventRegistration],
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessory_dump_parses_wire_format() {
        let dump: AccessoryDump = serde_json::from_str(
            r#"{
                "accessories": [{
                    "aid": 1,
                    "services": [{
                        "iid": 1,
                        "type": "0000003E-0000-1000-8000-0026BB765291",
                        "characteristics": [
                            {"iid": 2, "type": "23", "description": "Name", "value": "Kitchen Light"},
                            {"iid": 3, "type": "25", "value": false}
                        ]
                    }]
                }]
            }"#,
        )
        .unwrap();

        let accessory = &dump.accessories[0];
        assert_eq!(accessory.aid, Some(1));
        let characteristics = &accessory.services[0].characteristics;
        assert_eq!(characteristics[0].description.as_deref(), Some("Name"));
        assert_eq!(characteristics[1].description, None);
        assert_eq!(characteristics[1].char_type, "25");
        assert_eq!(characteristics[1].value, Value::Bool(false));
    }

    #[test]
    fn test_control_directive_serializes_flat() {
        let directive = ControlDirective {
            aid: 1,
            iid: 3,
            value: Value::Bool(true),
        };
        let json = serde_json::to_value(&directive).unwrap();
        assert_eq!(json, serde_json::json!({"aid": 1, "iid": 3, "value": true}));
    }
}
