//! Error types for synchronization and event routing.
//!
//! The taxonomy mirrors how failures are handled at runtime:
//! - [`Error::ThingAlreadyExists`] is an idempotency conflict and is absorbed
//!   by callers that tolerate it (thing types, thing groups) or converted
//!   into an update (things)
//! - [`Error::UnknownThing`] is a lookup miss during event routing; dropped,
//!   never retried, resolved by the next discovery pass
//! - [`Error::Registry`], [`Error::Shadow`], [`Error::Transport`] and
//!   [`Error::Control`] abort the current unit of work (one accessory, one
//!   message, one event) but never the process
//! - [`Error::MalformedDelta`] and [`Error::UnexpectedTopic`] mark inbound
//!   messages that cannot be routed and are dropped with context

use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while synchronizing things or routing events.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote create hit an existing resource.
    #[error("resource already exists: {0}")]
    ThingAlreadyExists(String),

    /// Remote registry call failed.
    #[error("registry operation '{op}' failed: {message}")]
    Registry { op: &'static str, message: String },

    /// Shadow update failed.
    #[error("shadow update failed for thing {thing_id}: {message}")]
    Shadow { thing_id: String, message: String },

    /// Streaming transport failure (connect, subscribe).
    #[error("transport: {0}")]
    Transport(String),

    /// Local control or registration call failed.
    #[error("control call failed for bridge {device_id}: {message}")]
    Control { device_id: String, message: String },

    /// No thing record for the referenced id.
    #[error("unknown thing id: {0}")]
    UnknownThing(String),

    /// Delta payload did not parse into the expected schema.
    #[error("malformed delta payload: {0}")]
    MalformedDelta(#[from] serde_json::Error),

    /// Message arrived on a topic the reconciler cannot route.
    #[error("unexpected delta topic: {0}")]
    UnexpectedTopic(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Other error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error is an absorbed idempotency conflict.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::ThingAlreadyExists(_))
    }
}
