//! Bidirectional state reconciliation.
//!
//! Two independent directions share nothing but the thing-registry snapshot:
//! - remote -> local: delta messages become batched control directives
//! - local -> remote: characteristic events become single-entry shadow pushes
//!
//! Every failure (malformed payload, lookup miss, remote call) is caught and
//! logged with enough context to diagnose; the reconciler keeps processing
//! subsequent messages indefinitely. Lookup misses are not retried: a stale
//! thing id is only actionable after the next discovery pass repopulates the
//! registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use shadowbridge_core::error::{Error, Result};
use shadowbridge_core::hap::{CharacteristicEvent, ControlDirective, HapController};

use crate::cloud::ShadowClient;
use crate::identity::derive_thing_id;
use crate::shadow::{shadow_document, thing_id_from_topic, DeltaMessage};
use crate::thing::ThingRegistry;

/// Routes state changes between the shadow service and local control.
pub struct Reconciler {
    namespace: String,
    things: Arc<ThingRegistry>,
    hap: Arc<dyn HapController>,
    shadows: Arc<dyn ShadowClient>,
}

impl Reconciler {
    pub fn new(
        namespace: impl Into<String>,
        things: Arc<ThingRegistry>,
        hap: Arc<dyn HapController>,
        shadows: Arc<dyn ShadowClient>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            things,
            hap,
            shadows,
        }
    }

    /// Handle one inbound delta message. Errors are logged and dropped.
    pub async fn handle_delta(&self, topic: &str, payload: &[u8]) {
        if let Err(e) = self.apply_delta(topic, payload).await {
            error!(topic, error = %e, "dropping delta message");
        }
    }

    async fn apply_delta(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let thing_id = thing_id_from_topic(topic)
            .ok_or_else(|| Error::UnexpectedTopic(topic.to_string()))?;
        let delta: DeltaMessage = serde_json::from_slice(payload)?;
        let thing = self
            .things
            .get(thing_id)
            .ok_or_else(|| Error::UnknownThing(thing_id.to_string()))?;

        // Not every capability need appear in every delta; unmatched names
        // are silently omitted.
        let directives: Vec<ControlDirective> = thing
            .capability_sources
            .iter()
            .filter_map(|(iid, capability)| {
                delta.state.get(capability).map(|value| ControlDirective {
                    aid: thing.accessory_id,
                    iid: *iid,
                    value: value.clone(),
                })
            })
            .collect();

        if directives.is_empty() {
            debug!(thing_id, "delta matched no known capabilities");
            return Ok(());
        }

        info!(
            name = %thing.name,
            thing_id,
            directives = directives.len(),
            "applying delta to local device"
        );
        self.hap.control(&thing.bridge_id, &directives).await
    }

    /// Handle a batch of local characteristic events.
    ///
    /// Each event is routed independently; a failure drops that event only.
    pub async fn handle_events(&self, events: &[CharacteristicEvent]) {
        for event in events {
            if let Err(e) = self.apply_event(event).await {
                error!(
                    device_id = %event.device_id,
                    aid = event.aid,
                    iid = event.iid,
                    value = %event.value,
                    error = %e,
                    "dropping characteristic event"
                );
            }
        }
    }

    async fn apply_event(&self, event: &CharacteristicEvent) -> Result<()> {
        let thing_id = derive_thing_id(&self.namespace, &event.device_id, Some(event.aid));
        let thing = self
            .things
            .get(&thing_id)
            .ok_or_else(|| Error::UnknownThing(thing_id.clone()))?;

        let Some(capability) = thing.capability_sources.get(&event.iid) else {
            debug!(
                thing_id,
                iid = event.iid,
                "event characteristic is not a tracked capability"
            );
            return Ok(());
        };

        info!(
            name = %thing.name,
            capability = %capability,
            value = %event.value,
            "updating shadow from local event"
        );
        let values = HashMap::from([(capability.clone(), event.value.clone())]);
        let document = shadow_document(&thing.id, &values);
        self.shadows.update_shadow(&thing.id, &document).await
    }
}
