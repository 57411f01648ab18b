//! Shadow document and delta message schemas.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Reported-state key carrying the connectivity marker.
pub const CONNECTIVITY_KEY: &str = "Connectivity";
/// Connectivity value reported on every shadow push.
pub const CONNECTIVITY_HEALTHY: &str = "HEALTHY";

const DELTA_TOPIC_PREFIX: &str = "$aws/things/";
const DELTA_TOPIC_SUFFIX: &str = "/shadow/update/delta";

/// Desired/reported state sections of a shadow update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowState {
    pub desired: Map<String, Value>,
    pub reported: Map<String, Value>,
}

/// Full shadow update document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowDocument {
    pub state: ShadowState,
}

/// Inbound delta notification payload.
///
/// Only the `state` object is routed; version and timestamp are accepted so
/// real payloads parse, but unused.
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaMessage {
    pub state: Map<String, Value>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// Build the shadow document for one capability snapshot.
///
/// Both sections carry the capability map; `reported` additionally carries
/// the connectivity marker. An empty map is a degraded update (only
/// connectivity is conveyed) and is warned about, but still sent.
pub fn shadow_document(thing_id: &str, capability_values: &HashMap<String, Value>) -> ShadowDocument {
    if capability_values.is_empty() {
        warn!(
            thing_id,
            "no capabilities in shadow update, only sending connectivity"
        );
    }
    let desired: Map<String, Value> = capability_values
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut reported = desired.clone();
    reported.insert(
        CONNECTIVITY_KEY.to_string(),
        Value::String(CONNECTIVITY_HEALTHY.to_string()),
    );
    ShadowDocument {
        state: ShadowState { desired, reported },
    }
}

/// Delta topic for one thing id.
pub fn delta_topic(thing_id: &str) -> String {
    format!("{}{}{}", DELTA_TOPIC_PREFIX, thing_id, DELTA_TOPIC_SUFFIX)
}

/// Extract the thing id from a delta topic.
pub fn thing_id_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(DELTA_TOPIC_PREFIX)?
        .strip_suffix(DELTA_TOPIC_SUFFIX)
}
