//! Cloud side of the bridge: registry synchronization, shadow state and the
//! bidirectional reconciliation protocol.
//!
//! ## Architecture
//!
//! - **[`sign`]**: SigV4 signing for the streaming transport URL and the
//!   REST calls
//! - **[`identity`]**: stable thing-id derivation from
//!   (namespace, bridge id, accessory id)
//! - **[`capability`]**: characteristic <-> capability translation and the
//!   recognized type tables
//! - **[`thing`]**: the swap-rebuilt thing registry
//! - **[`shadow`]**: shadow document / delta message schemas
//! - **[`cloud`]**: collaborator traits for the remote services
//! - **[`sync`]**: the discovery-to-registry synchronizer
//! - **[`reconcile`]**: the bidirectional event reconciler
//! - **[`rest`]**, **[`transport`]**: production implementations of the
//!   collaborator traits (reqwest, rumqttc)

pub mod capability;
pub mod cloud;
pub mod identity;
pub mod reconcile;
pub mod rest;
pub mod shadow;
pub mod sign;
pub mod sync;
pub mod thing;
pub mod transport;

pub use cloud::{DeltaSubscriber, ShadowClient, ThingRecord, ThingRegistryClient};
pub use identity::derive_thing_id;
pub use reconcile::Reconciler;
pub use rest::IotRestClient;
pub use shadow::{delta_topic, shadow_document, DeltaMessage, ShadowDocument};
pub use sign::{websocket_url, SigningCredentials};
pub use sync::Synchronizer;
pub use thing::{Thing, ThingRegistry};
pub use transport::{DeltaEnvelope, MqttTransport, TransportConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
