//! End-to-end synchronization and reconciliation flows against recording
//! mocks of the remote registry, shadow service, transport and local
//! control surface.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use shadowbridge_core::error::{Error, Result};
use shadowbridge_core::hap::{
    AccessoryDump, CharacteristicEvent, ControlDirective, EventRegistration, HapAccessory,
    HapBridge, HapCharacteristic, HapController, HapService,
};
use shadowbridge_iot::shadow::{delta_topic, ShadowDocument, CONNECTIVITY_KEY};
use shadowbridge_iot::{
    derive_thing_id, DeltaSubscriber, Reconciler, ShadowClient, Synchronizer, Thing, ThingRecord,
    ThingRegistry, ThingRegistryClient,
};

#[derive(Default)]
struct RecordingRegistry {
    existing_things: Mutex<HashSet<String>>,
    created_types: Mutex<Vec<String>>,
    created_groups: Mutex<Vec<String>>,
    created_things: Mutex<Vec<ThingRecord>>,
    updated_things: Mutex<Vec<ThingRecord>>,
    memberships: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ThingRegistryClient for RecordingRegistry {
    async fn create_thing_type(&self, name: &str) -> Result<()> {
        self.created_types.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn create_thing_group(&self, name: &str) -> Result<()> {
        let mut groups = self.created_groups.lock().unwrap();
        if groups.contains(&name.to_string()) {
            return Err(Error::ThingAlreadyExists(name.to_string()));
        }
        groups.push(name.to_string());
        Ok(())
    }

    async fn create_thing(&self, record: &ThingRecord) -> Result<()> {
        let mut existing = self.existing_things.lock().unwrap();
        if !existing.insert(record.thing_name.clone()) {
            return Err(Error::ThingAlreadyExists(record.thing_name.clone()));
        }
        self.created_things.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn update_thing(&self, record: &ThingRecord) -> Result<()> {
        self.updated_things.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn add_thing_to_group(&self, thing_name: &str, group_name: &str) -> Result<()> {
        self.memberships
            .lock()
            .unwrap()
            .push((thing_name.to_string(), group_name.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingShadows {
    updates: Mutex<Vec<(String, ShadowDocument)>>,
}

#[async_trait]
impl ShadowClient for RecordingShadows {
    async fn update_shadow(&self, thing_id: &str, document: &ShadowDocument) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((thing_id.to_string(), document.clone()));
        Ok(())
    }
}

/// Shadow service that starts failing after a fixed number of updates.
struct FlakyShadows {
    allow: usize,
    updates: Mutex<Vec<(String, ShadowDocument)>>,
}

impl FlakyShadows {
    fn new(allow: usize) -> Self {
        Self {
            allow,
            updates: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ShadowClient for FlakyShadows {
    async fn update_shadow(&self, thing_id: &str, document: &ShadowDocument) -> Result<()> {
        let mut updates = self.updates.lock().unwrap();
        if updates.len() >= self.allow {
            return Err(Error::Shadow {
                thing_id: thing_id.to_string(),
                message: "service unavailable".to_string(),
            });
        }
        updates.push((thing_id.to_string(), document.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSubscriber {
    topics: Mutex<Vec<String>>,
}

#[async_trait]
impl DeltaSubscriber for RecordingSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.topics.lock().unwrap().push(topic.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingHap {
    controls: Mutex<Vec<(String, Vec<ControlDirective>)>>,
    registrations: Mutex<Vec<(String, Vec<EventRegistration>)>>,
}

#[async_trait]
impl HapController for RecordingHap {
    async fn control(&self, device_id: &str, directives: &[ControlDirective]) -> Result<()> {
        self.controls
            .lock()
            .unwrap()
            .push((device_id.to_string(), directives.to_vec()));
        Ok(())
    }

    async fn register_events(
        &self,
        device_id: &str,
        registrations: &[EventRegistration],
    ) -> Result<()> {
        self.registrations
            .lock()
            .unwrap()
            .push((device_id.to_string(), registrations.to_vec()));
        Ok(())
    }
}

fn characteristic(iid: u64, char_type: &str, description: &str, value: Value) -> HapCharacteristic {
    HapCharacteristic {
        iid: Some(iid),
        char_type: char_type.to_string(),
        description: Some(description.to_string()),
        value,
    }
}

fn light_accessory(aid: u64, name: &str, on_iid: u64) -> HapAccessory {
    HapAccessory {
        aid: Some(aid),
        services: vec![
            HapService {
                iid: Some(1),
                service_type: "0000003E-0000-1000-8000-0026BB765291".to_string(),
                characteristics: vec![
                    characteristic(2, "23", "Name", json!(name)),
                    characteristic(3, "20", "Manufacturer", json!("Acme")),
                    characteristic(4, "30", "Serial Number", json!("SN-1")),
                    characteristic(5, "21", "Model", json!("Dimmer 2")),
                ],
            },
            HapService {
                iid: Some(8),
                service_type: "00000043-0000-1000-8000-0026BB765291".to_string(),
                characteristics: vec![
                    characteristic(9, "23", "Name", json!(name)),
                    characteristic(on_iid, "25", "On", json!(false)),
                ],
            },
        ],
    }
}

fn bridge(device_id: &str, accessories: Vec<HapAccessory>) -> HapBridge {
    HapBridge {
        name: "Test Bridge".to_string(),
        device_id: device_id.to_string(),
        accessories: AccessoryDump { accessories },
    }
}

struct Fixture {
    registry_client: Arc<RecordingRegistry>,
    shadows: Arc<RecordingShadows>,
    subscriber: Arc<RecordingSubscriber>,
    hap: Arc<RecordingHap>,
    things: Arc<ThingRegistry>,
    synchronizer: Synchronizer,
    reconciler: Reconciler,
}

fn fixture(filter_names: &[&str]) -> Fixture {
    let registry_client = Arc::new(RecordingRegistry::default());
    let shadows = Arc::new(RecordingShadows::default());
    let subscriber = Arc::new(RecordingSubscriber::default());
    let hap = Arc::new(RecordingHap::default());
    let things = Arc::new(ThingRegistry::new());

    let filter: HashMap<String, String> = filter_names
        .iter()
        .map(|name| (name.to_lowercase(), "LIGHT".to_string()))
        .collect();

    let synchronizer = Synchronizer::new(
        "my-home",
        filter,
        registry_client.clone(),
        shadows.clone(),
        subscriber.clone(),
        hap.clone(),
        things.clone(),
    );
    let reconciler = Reconciler::new("my-home", things.clone(), hap.clone(), shadows.clone());

    Fixture {
        registry_client,
        shadows,
        subscriber,
        hap,
        things,
        synchronizer,
        reconciler,
    }
}

#[tokio::test]
async fn test_kitchen_light_first_pass() {
    let fx = fixture(&["Kitchen Light"]);
    let bridges = vec![bridge("AA:BB:CC", vec![light_accessory(1, "Kitchen Light", 10)])];

    let count = fx.synchronizer.synchronize(&bridges).await;
    assert_eq!(count, 1);

    let expected_id = derive_thing_id("my-home", "AA:BB:CC", Some(1));

    // Thing type ensured for the light service.
    assert!(fx
        .registry_client
        .created_types
        .lock()
        .unwrap()
        .contains(&"LIGHT".to_string()));

    // Thing created with the derived id and the accessory-info attributes.
    let created = fx.registry_client.created_things.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].thing_name, expected_id);
    assert_eq!(created[0].thing_type, "LIGHT");
    assert!(created[0].attributes.contains_key("accessoryInfo"));

    // Initial shadow: desired.On=false, reported.On=false + Connectivity.
    let updates = fx.shadows.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    let (thing_id, document) = &updates[0];
    assert_eq!(thing_id, &expected_id);
    assert_eq!(document.state.desired["On"], json!(false));
    assert_eq!(document.state.reported["On"], json!(false));
    assert_eq!(document.state.reported[CONNECTIVITY_KEY], json!("HEALTHY"));

    // One delta subscription on the exact topic.
    assert_eq!(
        *fx.subscriber.topics.lock().unwrap(),
        vec![delta_topic(&expected_id)]
    );

    // Registry holds the one thing.
    let thing: Thing = fx.things.get(&expected_id).unwrap();
    assert_eq!(thing.name, "Kitchen Light");
    assert_eq!(thing.capability_sources.get(&10).map(String::as_str), Some("On"));

    // Event registrations batched per bridge.
    let registrations = fx.hap.registrations.lock().unwrap();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].0, "AA:BB:CC");
    assert!(registrations[0].1.iter().all(|r| r.ev && r.aid == 1));
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let fx = fixture(&["Kitchen Light"]);
    let bridges = vec![bridge("AA:BB:CC", vec![light_accessory(1, "Kitchen Light", 10)])];

    assert_eq!(fx.synchronizer.synchronize(&bridges).await, 1);
    let first_snapshot = fx.things.snapshot();

    // Second pass: creates conflict, the synchronizer falls back to update.
    assert_eq!(fx.synchronizer.synchronize(&bridges).await, 1);

    assert_eq!(fx.registry_client.created_things.lock().unwrap().len(), 1);
    assert_eq!(fx.registry_client.updated_things.lock().unwrap().len(), 1);

    let second_snapshot = fx.things.snapshot();
    assert_eq!(first_snapshot.len(), second_snapshot.len());
    assert!(second_snapshot.keys().all(|k| first_snapshot.contains_key(k)));
}

#[tokio::test]
async fn test_filtered_device_produces_nothing() {
    let fx = fixture(&["Bedroom Light"]);
    let bridges = vec![bridge("AA:BB:CC", vec![light_accessory(1, "Kitchen Light", 10)])];

    assert_eq!(fx.synchronizer.synchronize(&bridges).await, 0);
    assert!(fx.registry_client.created_things.lock().unwrap().is_empty());
    assert!(fx.shadows.updates.lock().unwrap().is_empty());
    assert!(fx.subscriber.topics.lock().unwrap().is_empty());
    assert!(fx.things.is_empty());
}

#[tokio::test]
async fn test_capability_less_service_produces_no_thing() {
    let fx = fixture(&["Label Only"]);
    let accessory = HapAccessory {
        aid: Some(1),
        services: vec![HapService {
            iid: Some(1),
            service_type: "0000003E-0000-1000-8000-0026BB765291".to_string(),
            characteristics: vec![characteristic(2, "23", "Name", json!("Label Only"))],
        }],
    };
    let bridges = vec![bridge("AA:BB:CC", vec![accessory])];

    assert_eq!(fx.synchronizer.synchronize(&bridges).await, 0);
    assert!(fx.registry_client.created_things.lock().unwrap().is_empty());
    assert!(fx.things.is_empty());
}

#[tokio::test]
async fn test_delta_translates_to_control_directive() {
    let fx = fixture(&["Kitchen Light"]);
    let bridges = vec![bridge("AA:BB:CC", vec![light_accessory(1, "Kitchen Light", 10)])];
    fx.synchronizer.synchronize(&bridges).await;

    let thing_id = derive_thing_id("my-home", "AA:BB:CC", Some(1));
    fx.reconciler
        .handle_delta(
            &delta_topic(&thing_id),
            br#"{"state":{"On":true},"version":3}"#,
        )
        .await;

    let controls = fx.hap.controls.lock().unwrap();
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].0, "AA:BB:CC");
    assert_eq!(
        controls[0].1,
        vec![ControlDirective {
            aid: 1,
            iid: 10,
            value: json!(true)
        }]
    );
}

#[tokio::test]
async fn test_unknown_thing_delta_is_dropped_without_poisoning() {
    let fx = fixture(&["Kitchen Light"]);
    let bridges = vec![bridge("AA:BB:CC", vec![light_accessory(1, "Kitchen Light", 10)])];
    fx.synchronizer.synchronize(&bridges).await;

    fx.reconciler
        .handle_delta(&delta_topic("bm90LWEtdGhpbmc"), br#"{"state":{"On":true}}"#)
        .await;
    assert!(fx.hap.controls.lock().unwrap().is_empty());

    // Subsequent messages still route.
    let thing_id = derive_thing_id("my-home", "AA:BB:CC", Some(1));
    fx.reconciler
        .handle_delta(&delta_topic(&thing_id), br#"{"state":{"On":false}}"#)
        .await;
    assert_eq!(fx.hap.controls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_delta_is_dropped() {
    let fx = fixture(&["Kitchen Light"]);
    let bridges = vec![bridge("AA:BB:CC", vec![light_accessory(1, "Kitchen Light", 10)])];
    fx.synchronizer.synchronize(&bridges).await;

    let thing_id = derive_thing_id("my-home", "AA:BB:CC", Some(1));
    fx.reconciler
        .handle_delta(&delta_topic(&thing_id), b"not json at all")
        .await;
    assert!(fx.hap.controls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_local_event_pushes_single_capability_shadow() {
    let fx = fixture(&["Kitchen Light"]);
    let bridges = vec![bridge("AA:BB:CC", vec![light_accessory(1, "Kitchen Light", 10)])];
    fx.synchronizer.synchronize(&bridges).await;
    let baseline = fx.shadows.updates.lock().unwrap().len();

    let event = CharacteristicEvent {
        device_id: "AA:BB:CC".to_string(),
        aid: 1,
        iid: 10,
        value: json!(true),
        status: true,
    };
    fx.reconciler.handle_events(&[event]).await;

    let updates = fx.shadows.updates.lock().unwrap();
    assert_eq!(updates.len(), baseline + 1);
    let (_, document) = updates.last().unwrap();
    assert_eq!(document.state.desired.len(), 1);
    assert_eq!(document.state.desired["On"], json!(true));
    assert_eq!(document.state.reported[CONNECTIVITY_KEY], json!("HEALTHY"));
}

#[tokio::test]
async fn test_event_without_matching_iid_pushes_nothing() {
    let fx = fixture(&["Kitchen Light"]);
    let bridges = vec![bridge("AA:BB:CC", vec![light_accessory(1, "Kitchen Light", 10)])];
    fx.synchronizer.synchronize(&bridges).await;
    let baseline = fx.shadows.updates.lock().unwrap().len();

    let event = CharacteristicEvent {
        device_id: "AA:BB:CC".to_string(),
        aid: 1,
        iid: 99,
        value: json!(true),
        status: true,
    };
    fx.reconciler.handle_events(&[event]).await;

    assert_eq!(fx.shadows.updates.lock().unwrap().len(), baseline);
}

#[tokio::test]
async fn test_event_batch_continues_past_unknown_thing() {
    let fx = fixture(&["Kitchen Light"]);
    let bridges = vec![bridge("AA:BB:CC", vec![light_accessory(1, "Kitchen Light", 10)])];
    fx.synchronizer.synchronize(&bridges).await;
    let baseline = fx.shadows.updates.lock().unwrap().len();

    let events = vec![
        CharacteristicEvent {
            device_id: "ZZ:ZZ:ZZ".to_string(),
            aid: 9,
            iid: 10,
            value: json!(true),
            status: true,
        },
        CharacteristicEvent {
            device_id: "AA:BB:CC".to_string(),
            aid: 1,
            iid: 10,
            value: json!(true),
            status: true,
        },
    ];
    fx.reconciler.handle_events(&events).await;

    assert_eq!(fx.shadows.updates.lock().unwrap().len(), baseline + 1);
}

#[tokio::test]
async fn test_partial_accessory_failure_keeps_event_registrations() {
    let registry_client = Arc::new(RecordingRegistry::default());
    let shadows = Arc::new(FlakyShadows::new(1));
    let subscriber = Arc::new(RecordingSubscriber::default());
    let hap = Arc::new(RecordingHap::default());
    let things = Arc::new(ThingRegistry::new());
    let synchronizer = Synchronizer::new(
        "my-home",
        HashMap::from([("kitchen light".to_string(), "LIGHT".to_string())]),
        registry_client.clone(),
        shadows.clone(),
        subscriber.clone(),
        hap.clone(),
        things.clone(),
    );

    // Two capability services on one accessory; the shadow service fails on
    // the second, aborting that accessory's remaining services.
    let accessory = HapAccessory {
        aid: Some(1),
        services: vec![
            HapService {
                iid: Some(1),
                service_type: "0000003E-0000-1000-8000-0026BB765291".to_string(),
                characteristics: vec![characteristic(2, "23", "Name", json!("Kitchen Light"))],
            },
            HapService {
                iid: Some(8),
                service_type: "00000043-0000-1000-8000-0026BB765291".to_string(),
                characteristics: vec![
                    characteristic(9, "23", "Name", json!("Kitchen Light")),
                    characteristic(10, "25", "On", json!(false)),
                ],
            },
            HapService {
                iid: Some(16),
                service_type: "00000047-0000-1000-8000-0026BB765291".to_string(),
                characteristics: vec![
                    characteristic(17, "23", "Name", json!("Kitchen Light")),
                    characteristic(18, "25", "On", json!(true)),
                ],
            },
        ],
    };
    let bridges = vec![bridge("AA:BB:CC", vec![accessory])];

    assert_eq!(synchronizer.synchronize(&bridges).await, 1);

    // The thing from the first service survives the pass.
    let thing_id = derive_thing_id("my-home", "AA:BB:CC", Some(1));
    let thing = things.get(&thing_id).unwrap();
    assert_eq!(thing.capability_sources.get(&10).map(String::as_str), Some("On"));

    // Event registrations for the accessory still reach the bridge.
    let registrations = hap.registrations.lock().unwrap();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].0, "AA:BB:CC");
    assert!(registrations[0].1.iter().any(|r| r.iid == 10));
}

#[tokio::test]
async fn test_duplicate_capability_names_stay_per_thing() {
    let fx = fixture(&["Kitchen Light", "Desk Lamp"]);
    let bridges = vec![bridge(
        "AA:BB:CC",
        vec![
            light_accessory(1, "Kitchen Light", 10),
            light_accessory(2, "Desk Lamp", 12),
        ],
    )];
    assert_eq!(fx.synchronizer.synchronize(&bridges).await, 2);

    // A delta for the lamp only drives the lamp's accessory and iid.
    let lamp_id = derive_thing_id("my-home", "AA:BB:CC", Some(2));
    fx.reconciler
        .handle_delta(&delta_topic(&lamp_id), br#"{"state":{"On":true}}"#)
        .await;

    let controls = fx.hap.controls.lock().unwrap();
    assert_eq!(controls.len(), 1);
    assert_eq!(
        controls[0].1,
        vec![ControlDirective {
            aid: 2,
            iid: 12,
            value: json!(true)
        }]
    );
}
