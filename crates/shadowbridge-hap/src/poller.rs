//! Poll-based characteristic-change detection.
//!
//! The accessory protocol delivers change events over a held-open
//! connection; this bridge instead samples registered characteristics on an
//! interval and emits a batch for every observed change. The first sample
//! only seeds the baseline, so startup does not replay the whole state as
//! events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use shadowbridge_core::hap::CharacteristicEvent;

use crate::client::HapHttpClient;

/// Samples one bridge's characteristics and emits change batches.
pub struct EventPoller {
    client: Arc<HapHttpClient>,
    interval: Duration,
    events: mpsc::Sender<Vec<CharacteristicEvent>>,
}

impl EventPoller {
    pub fn new(
        client: Arc<HapHttpClient>,
        interval: Duration,
        events: mpsc::Sender<Vec<CharacteristicEvent>>,
    ) -> Self {
        Self {
            client,
            interval,
            events,
        }
    }

    /// Spawn the poll loop for one bridge and its registered ids.
    ///
    /// The task runs until aborted (the caller restarts pollers after each
    /// discovery pass) or until the event channel closes.
    pub fn spawn(&self, device_id: String, ids: Vec<(u64, u64)>) -> JoinHandle<()> {
        let client = self.client.clone();
        let events = self.events.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            if ids.is_empty() {
                return;
            }
            let mut last: HashMap<(u64, u64), Value> = HashMap::new();
            let mut seeded = false;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let readings = match client.read_characteristics(&device_id, &ids).await {
                    Ok(readings) => readings,
                    Err(e) => {
                        warn!(device_id, error = %e, "characteristic poll failed");
                        continue;
                    }
                };

                let mut changed = Vec::new();
                for reading in readings {
                    let key = (reading.aid, reading.iid);
                    let previous = last.insert(key, reading.value.clone());
                    if seeded && previous.as_ref() != Some(&reading.value) {
                        changed.push(CharacteristicEvent {
                            device_id: device_id.clone(),
                            aid: reading.aid,
                            iid: reading.iid,
                            value: reading.value,
                            status: reading.status.unwrap_or(0) == 0,
                        });
                    }
                }
                seeded = true;

                if !changed.is_empty() {
                    debug!(device_id, changes = changed.len(), "emitting characteristic events");
                    if events.send(changed).await.is_err() {
                        return;
                    }
                }
            }
        })
    }
}
