//! Discovery-to-registry synchronization.
//!
//! One pass walks the discovered accessory graph, ensures the remote
//! registry mirrors it (thing group, thing types, things, initial shadows,
//! delta subscriptions, event registrations) and rebuilds the in-memory
//! thing registry. The pass builds into a fresh map and swaps it in at the
//! end, so concurrent lookups never observe a half-populated registry.
//!
//! Failure classification per step:
//! - thing-group / thing-type creation: already-exists absorbed, other
//!   failures logged and ignored (the create is advisory)
//! - thing creation: already-exists falls back to an update; anything else
//!   aborts the current accessory's remaining services (things already
//!   synced for it stay in the pass, registrations included)
//! - shadow push: aborts the current accessory's remaining services
//! - group membership, delta subscription, event registration: best-effort,
//!   logged only
//! - the whole pass: caught at the top, logged, reports zero

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use shadowbridge_core::error::{Error, Result};
use shadowbridge_core::hap::{
    EventRegistration, HapAccessory, HapBridge, HapCharacteristic, HapController, HapService,
};

use crate::capability;
use crate::cloud::{
    DeltaSubscriber, ShadowClient, ThingRecord, ThingRegistryClient, ATTR_ACCESSORY_INFO,
    ATTR_DESCRIPTION,
};
use crate::identity::{derive_thing_id, encode_name};
use crate::shadow::{delta_topic, shadow_document};
use crate::thing::{Thing, ThingRegistry};

const THING_DESCRIPTION: &str = "Discovered via shadowbridge";

/// Rebuilds the thing registry from a discovered accessory graph.
pub struct Synchronizer {
    namespace: String,
    group_name: String,
    /// Lower-cased display name -> category.
    filter: HashMap<String, String>,
    registry_client: Arc<dyn ThingRegistryClient>,
    shadows: Arc<dyn ShadowClient>,
    subscriber: Arc<dyn DeltaSubscriber>,
    hap: Arc<dyn HapController>,
    things: Arc<ThingRegistry>,
}

impl Synchronizer {
    pub fn new(
        namespace: impl Into<String>,
        filter: HashMap<String, String>,
        registry_client: Arc<dyn ThingRegistryClient>,
        shadows: Arc<dyn ShadowClient>,
        subscriber: Arc<dyn DeltaSubscriber>,
        hap: Arc<dyn HapController>,
        things: Arc<ThingRegistry>,
    ) -> Self {
        let namespace = namespace.into();
        let group_name = encode_name(&namespace);
        Self {
            namespace,
            group_name,
            filter,
            registry_client,
            shadows,
            subscriber,
            hap,
            things,
        }
    }

    /// Run one full synchronization pass.
    ///
    /// Never fails: an unrecoverable error inside the pass is logged and the
    /// previous registry snapshot stays in place until the next pass.
    pub async fn synchronize(&self, bridges: &[HapBridge]) -> usize {
        match self.run_pass(bridges).await {
            Ok(count) => {
                info!(count, "discovery pass completed, things synchronized");
                count
            }
            Err(e) => {
                error!(error = %e, "discovery pass failed");
                0
            }
        }
    }

    async fn run_pass(&self, bridges: &[HapBridge]) -> Result<usize> {
        debug!(bridges = bridges.len(), "starting synchronization pass");
        let mut next: HashMap<String, Thing> = HashMap::new();
        let mut seen_types: HashSet<&'static str> = HashSet::new();
        let mut count = 0usize;

        self.ensure_group().await;

        for bridge in bridges {
            let mut registrations: Vec<EventRegistration> = Vec::new();
            for accessory in &bridge.accessories.accessories {
                let synced = self
                    .sync_accessory(bridge, accessory, &mut seen_types, &mut next)
                    .await;
                if synced > 0 {
                    count += synced;
                    registrations.extend(event_registrations(accessory));
                }
            }
            if !registrations.is_empty() {
                if let Err(e) = self.hap.register_events(&bridge.device_id, &registrations).await {
                    warn!(bridge = %bridge.device_id, error = %e, "failed to register for events");
                } else {
                    debug!(
                        bridge = %bridge.device_id,
                        characteristics = registrations.len(),
                        "registered for characteristic events"
                    );
                }
            }
        }

        self.things.replace(next);
        Ok(count)
    }

    /// Idempotent thing-group creation; failures are advisory.
    async fn ensure_group(&self) {
        match self.registry_client.create_thing_group(&self.group_name).await {
            Ok(()) => debug!(group = %self.group_name, "thing group created"),
            Err(e) if e.is_already_exists() => {
                debug!(group = %self.group_name, "thing group already exists");
            }
            Err(e) => warn!(group = %self.group_name, error = %e, "failed to create thing group"),
        }
    }

    /// Idempotent thing-type creation, at most once per classifier per pass.
    async fn ensure_thing_type(
        &self,
        thing_type: &'static str,
        seen_types: &mut HashSet<&'static str>,
    ) {
        if !seen_types.insert(thing_type) {
            return;
        }
        match self.registry_client.create_thing_type(thing_type).await {
            Ok(()) => debug!(thing_type, "thing type created"),
            Err(e) if e.is_already_exists() => debug!(thing_type, "thing type already exists"),
            Err(e) => warn!(thing_type, error = %e, "failed to create thing type"),
        }
    }

    /// Synchronize every eligible service of one accessory.
    ///
    /// Returns the number of services that produced a thing record. An error
    /// aborts the remaining services of this accessory only; services that
    /// already synced keep their registry entries and their claim to event
    /// registrations.
    async fn sync_accessory(
        &self,
        bridge: &HapBridge,
        accessory: &HapAccessory,
        seen_types: &mut HashSet<&'static str>,
        next: &mut HashMap<String, Thing>,
    ) -> usize {
        let Some(info_service) = accessory.services.first() else {
            return 0;
        };
        let info_map = capability::characteristic_map(info_service);
        let mut synced = 0usize;

        for service in &accessory.services {
            match self
                .sync_service(bridge, accessory, service, &info_map, seen_types, next)
                .await
            {
                Ok(true) => synced += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        bridge = %bridge.device_id,
                        aid = ?accessory.aid,
                        error = %e,
                        "failed to synchronize accessory, skipping its remaining services"
                    );
                    break;
                }
            }
        }
        synced
    }

    /// Synchronize one service. Returns whether it produced a thing record.
    async fn sync_service(
        &self,
        bridge: &HapBridge,
        accessory: &HapAccessory,
        service: &HapService,
        info_map: &HashMap<String, &HapCharacteristic>,
        seen_types: &mut HashSet<&'static str>,
        next: &mut HashMap<String, Thing>,
    ) -> Result<bool> {
        let service_map = capability::characteristic_map(service);
        let name = match capability::characteristic_value(&service_map, info_map, "Name") {
            serde_json::Value::String(name) => name,
            other => other.to_string(),
        };

        if !self.filter.contains_key(&name.to_lowercase()) {
            debug!(name, "device skipped by filter list");
            return Ok(false);
        }

        let id = derive_thing_id(&self.namespace, &bridge.device_id, accessory.aid);
        let thing_type = capability::device_type(&service.service_type);
        self.ensure_thing_type(thing_type, seen_types).await;

        let capability_values = capability::capability_values(&service_map);
        if capability_values.is_empty() {
            debug!(name, "ignoring service without capabilities");
            return Ok(false);
        }

        let record = self.thing_record(&id, &name, thing_type, info_map);
        self.create_or_update_thing(&record).await?;

        let document = shadow_document(&id, &capability_values);
        self.shadows
            .update_shadow(&id, &document)
            .await
            .map_err(|e| match e {
                Error::Shadow { .. } => e,
                other => Error::Shadow {
                    thing_id: id.clone(),
                    message: other.to_string(),
                },
            })?;

        let thing = Thing {
            id: id.clone(),
            bridge_id: bridge.device_id.clone(),
            accessory_id: accessory.aid.unwrap_or(0),
            name: name.clone(),
            capability_sources: capability::capability_sources(&service_map),
            capability_values,
        };
        next.insert(id.clone(), thing);

        if let Err(e) = self
            .registry_client
            .add_thing_to_group(&id, &self.group_name)
            .await
        {
            warn!(thing_id = %id, error = %e, "failed to add thing to group");
        }

        let topic = delta_topic(&id);
        if let Err(e) = self.subscriber.subscribe(&topic).await {
            error!(
                topic,
                error = %e,
                "failed to subscribe to delta topic, inbound state changes will not reach this thing"
            );
        } else {
            debug!(topic, "subscribed to delta topic");
        }

        debug!(name, thing_id = %id, thing_type, "thing synchronized");
        Ok(true)
    }

    /// Create the thing record, falling back to an update on conflict.
    async fn create_or_update_thing(&self, record: &ThingRecord) -> Result<()> {
        match self.registry_client.create_thing(record).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() => {
                debug!(thing = %record.thing_name, "thing already exists, updating");
                self.registry_client.update_thing(record).await
            }
            Err(e) => Err(e),
        }
    }

    fn thing_record(
        &self,
        id: &str,
        name: &str,
        thing_type: &str,
        info_map: &HashMap<String, &HapCharacteristic>,
    ) -> ThingRecord {
        let empty = HashMap::new();
        let lookup = |key| capability::characteristic_value(info_map, &empty, key);
        let accessory_info = json!({
            "nm": name,
            "man": lookup("Manufacturer"),
            "sn": lookup("Serial Number"),
            "fr": lookup("Firmware Revision"),
            "md": lookup("Model"),
        });
        let attributes = HashMap::from([
            (
                ATTR_ACCESSORY_INFO.to_string(),
                encode_name(&accessory_info.to_string()),
            ),
            (
                ATTR_DESCRIPTION.to_string(),
                encode_name(THING_DESCRIPTION),
            ),
        ]);
        ThingRecord {
            thing_name: id.to_string(),
            thing_type: thing_type.to_string(),
            attributes,
        }
    }
}

/// Characteristics of one accessory eligible for change notifications.
///
/// Both the accessory id and the characteristic id must be present.
fn event_registrations(accessory: &HapAccessory) -> Vec<EventRegistration> {
    let Some(aid) = accessory.aid else {
        return Vec::new();
    };
    accessory
        .services
        .iter()
        .flat_map(|service| &service.characteristics)
        .filter_map(|characteristic| {
            characteristic.iid.map(|iid| EventRegistration { aid, iid, ev: true })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowbridge_core::hap::HapService;

    #[test]
    fn test_event_registrations_require_both_ids() {
        let accessory = HapAccessory {
            aid: Some(3),
            services: vec![HapService {
                iid: Some(1),
                service_type: "00000043".to_string(),
                characteristics: vec![
                    HapCharacteristic {
                        iid: Some(7),
                        char_type: "25".to_string(),
                        description: Some("On".to_string()),
                        value: serde_json::Value::Bool(false),
                    },
                    HapCharacteristic {
                        iid: None,
                        char_type: "8".to_string(),
                        description: Some("Brightness".to_string()),
                        value: serde_json::Value::Null,
                    },
                ],
            }],
        };

        let registrations = event_registrations(&accessory);
        assert_eq!(
            registrations,
            vec![EventRegistration {
                aid: 3,
                iid: 7,
                ev: true
            }]
        );

        let without_aid = HapAccessory {
            aid: None,
            ..accessory
        };
        assert!(event_registrations(&without_aid).is_empty());
    }
}
