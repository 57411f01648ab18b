//! Collaborator traits for the remote registry, shadow and delta services.
//!
//! The synchronizer and reconciler only speak through these traits; the
//! SigV4 REST client in [`crate::rest`] and the MQTT transport in
//! [`crate::transport`] are the production implementations, and the
//! integration tests substitute recording mocks.

use std::collections::HashMap;

use async_trait::async_trait;

use shadowbridge_core::error::Result;

use crate::shadow::ShadowDocument;

/// Attribute key carrying the encoded accessory-info blob.
pub const ATTR_ACCESSORY_INFO: &str = "accessoryInfo";
/// Attribute key carrying the encoded description.
pub const ATTR_DESCRIPTION: &str = "description";

/// Request payload for creating or updating a thing record.
#[derive(Debug, Clone)]
pub struct ThingRecord {
    pub thing_name: String,
    pub thing_type: String,
    /// Opaque attribute blobs (already encoded into the registry alphabet).
    pub attributes: HashMap<String, String>,
}

/// Idempotency-aware registry operations.
///
/// `create_*` calls return [`shadowbridge_core::Error::ThingAlreadyExists`]
/// on a conflict; callers decide whether to absorb it or fall back to an
/// update.
#[async_trait]
pub trait ThingRegistryClient: Send + Sync {
    async fn create_thing_type(&self, name: &str) -> Result<()>;

    async fn create_thing_group(&self, name: &str) -> Result<()>;

    async fn create_thing(&self, record: &ThingRecord) -> Result<()>;

    async fn update_thing(&self, record: &ThingRecord) -> Result<()>;

    async fn add_thing_to_group(&self, thing_name: &str, group_name: &str) -> Result<()>;
}

/// Shadow document delivery.
#[async_trait]
pub trait ShadowClient: Send + Sync {
    async fn update_shadow(&self, thing_id: &str, document: &ShadowDocument) -> Result<()>;
}

/// Per-topic delta subscription on the streaming transport.
#[async_trait]
pub trait DeltaSubscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<()>;
}
