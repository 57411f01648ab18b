//! Stable thing-identity derivation.
//!
//! A thing id is a pure function of (namespace, bridge id, accessory id).
//! It never depends on mutable attributes like the display name, so renaming
//! a device keeps its identity and its remote shadow.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

const SEPARATOR: char = '~';

/// Derive the opaque thing id for one accessory.
///
/// A missing accessory id defaults to 0. The joined triple is encoded with
/// URL-safe unpadded base64, which stays inside the thing-name alphabet of
/// the remote registry and remains reversible for debugging.
pub fn derive_thing_id(namespace: &str, bridge_id: &str, accessory_id: Option<u64>) -> String {
    encode_name(&format!(
        "{}{}{}{}{}",
        namespace,
        SEPARATOR,
        bridge_id,
        SEPARATOR,
        accessory_id.unwrap_or(0)
    ))
}

/// Encode an arbitrary string into the registry's name alphabet.
///
/// Also used for the thing-group name and attribute blobs.
pub fn encode_name(raw: &str) -> String {
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}
