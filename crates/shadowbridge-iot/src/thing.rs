//! Thing records and the shared thing registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Canonical record of one synchronized device.
#[derive(Debug, Clone)]
pub struct Thing {
    /// Derived opaque identifier, stable across re-discovery.
    pub id: String,
    /// Identifier of the owning local bridge process.
    pub bridge_id: String,
    /// Accessory id within that bridge.
    pub accessory_id: u64,
    /// Display name at creation time.
    pub name: String,
    /// Capability snapshot at creation time.
    pub capability_values: HashMap<String, Value>,
    /// Characteristic instance id -> capability name.
    pub capability_sources: HashMap<u64, String>,
}

/// Process-wide thing id -> [`Thing`] mapping.
///
/// The registry is rebuilt on every discovery pass: the synchronizer builds
/// a complete map off to the side and swaps it in atomically, so concurrent
/// lookups observe either the previous snapshot or the new one, never a
/// half-populated map. Lookup misses are expected during rebuilds and are
/// treated as drops by the reconciler.
#[derive(Debug, Default)]
pub struct ThingRegistry {
    inner: RwLock<Arc<HashMap<String, Thing>>>,
}

impl ThingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one thing by id, cloning it out of the current snapshot.
    pub fn get(&self, id: &str) -> Option<Thing> {
        self.snapshot().get(id).cloned()
    }

    /// The current immutable snapshot.
    pub fn snapshot(&self) -> Arc<HashMap<String, Thing>> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in a freshly built map, superseding the previous snapshot.
    pub fn replace(&self, things: HashMap<String, Thing>) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(things);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
