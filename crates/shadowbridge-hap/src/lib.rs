//! HTTP client for the local accessory network.
//!
//! Instances are addressed from configuration; the client speaks the
//! accessory protocol's REST surface: `GET /accessories` for the discovery
//! dump, `PUT /characteristics` for batched control writes and event
//! registration, `GET /characteristics` for value reads. Push event
//! delivery is stood in for by [`poller::EventPoller`], which diffs polled
//! values and emits change batches.

pub mod client;
pub mod poller;

pub use client::HapHttpClient;
pub use poller::EventPoller;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
