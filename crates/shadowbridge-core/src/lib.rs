//! Shared foundation for the shadowbridge workspace.
//!
//! This crate carries the pieces every other crate needs:
//! - **Configuration**: the bridge configuration document and its
//!   environment-variable overrides
//! - **Errors**: the single error enum used across synchronization and
//!   event routing
//! - **Accessory model**: the local accessory-network data model (bridges,
//!   accessories, services, characteristics) plus the collaborator traits
//!   for controlling it

pub mod config;
pub mod error;
pub mod hap;

pub use config::{BridgeConfig, DeviceFilterEntry, HapInstanceConfig};
pub use error::{Error, Result};
pub use hap::{
    AccessoryDump, CharacteristicEvent, ControlDirective, EventRegistration, HapAccessory,
    HapBridge, HapCharacteristic, HapController, HapService,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
