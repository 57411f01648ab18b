//! REST client for accessory-network instances.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use shadowbridge_core::config::HapInstanceConfig;
use shadowbridge_core::error::{Error, Result};
use shadowbridge_core::hap::{
    AccessoryDump, ControlDirective, EventRegistration, HapBridge, HapController,
};

/// Request body for `PUT /characteristics`.
#[derive(Debug, Serialize)]
struct CharacteristicsBody<T> {
    characteristics: Vec<T>,
}

/// One entry of a `GET /characteristics` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CharacteristicReading {
    pub aid: u64,
    pub iid: u64,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub status: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    characteristics: Vec<CharacteristicReading>,
}

/// HTTP client for every configured accessory-network instance.
pub struct HapHttpClient {
    http: reqwest::Client,
    pin: String,
    instances: Vec<HapInstanceConfig>,
    /// Bridge device id -> base URL.
    endpoints: HashMap<String, String>,
}

impl HapHttpClient {
    pub fn new(pin: impl Into<String>, instances: Vec<HapInstanceConfig>) -> Self {
        let endpoints = instances
            .iter()
            .map(|i| (i.device_id.clone(), format!("http://{}:{}", i.host, i.port)))
            .collect();
        Self {
            http: reqwest::Client::new(),
            pin: pin.into(),
            instances,
            endpoints,
        }
    }

    fn endpoint(&self, device_id: &str) -> Result<&str> {
        self.endpoints
            .get(device_id)
            .map(String::as_str)
            .ok_or_else(|| Error::Control {
                device_id: device_id.to_string(),
                message: "no configured instance for bridge".to_string(),
            })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.pin.is_empty() {
            builder
        } else {
            builder.header("authorization", &self.pin)
        }
    }

    /// Enumerate the accessory graph of every configured instance.
    ///
    /// An unreachable instance is logged and skipped; discovery succeeds
    /// with whatever answered.
    pub async fn discover(&self) -> Vec<HapBridge> {
        let mut bridges = Vec::new();
        for instance in &self.instances {
            let url = format!("http://{}:{}/accessories", instance.host, instance.port);
            let response = self.request(self.http.get(&url)).send().await;
            let dump: std::result::Result<AccessoryDump, String> = match response {
                Ok(r) if r.status().is_success() => {
                    r.json().await.map_err(|e| e.to_string())
                }
                Ok(r) => Err(format!("status {}", r.status())),
                Err(e) => Err(e.to_string()),
            };
            match dump {
                Ok(accessories) => {
                    debug!(
                        bridge = %instance.device_id,
                        accessories = accessories.accessories.len(),
                        "discovered accessory graph"
                    );
                    bridges.push(HapBridge {
                        name: instance.name.clone(),
                        device_id: instance.device_id.clone(),
                        accessories,
                    });
                }
                Err(message) => {
                    warn!(bridge = %instance.device_id, %url, message, "discovery failed for instance");
                }
            }
        }
        bridges
    }

    /// Read current values for (aid, iid) pairs on one bridge.
    pub async fn read_characteristics(
        &self,
        device_id: &str,
        ids: &[(u64, u64)],
    ) -> Result<Vec<CharacteristicReading>> {
        let base = self.endpoint(device_id)?;
        let query: Vec<String> = ids.iter().map(|(aid, iid)| format!("{}.{}", aid, iid)).collect();
        let url = format!("{}/characteristics?id={}", base, query.join(","));
        let response = self
            .request(self.http.get(&url))
            .send()
            .await
            .map_err(|e| Error::Control {
                device_id: device_id.to_string(),
                message: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(Error::Control {
                device_id: device_id.to_string(),
                message: format!("read returned {}", response.status()),
            });
        }
        let body: ReadResponse = response.json().await.map_err(|e| Error::Control {
            device_id: device_id.to_string(),
            message: e.to_string(),
        })?;
        Ok(body.characteristics)
    }

    async fn put_characteristics<T: Serialize + Send + Sync>(
        &self,
        device_id: &str,
        characteristics: Vec<T>,
    ) -> Result<()> {
        let base = self.endpoint(device_id)?;
        let url = format!("{}/characteristics", base);
        let body = CharacteristicsBody { characteristics };
        let response = self
            .request(self.http.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Control {
                device_id: device_id.to_string(),
                message: e.to_string(),
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Control {
                device_id: device_id.to_string(),
                message: format!("write returned {}", response.status()),
            })
        }
    }
}

#[async_trait]
impl HapController for HapHttpClient {
    async fn control(&self, device_id: &str, directives: &[ControlDirective]) -> Result<()> {
        debug!(device_id, directives = directives.len(), "applying control batch");
        self.put_characteristics(device_id, directives.to_vec()).await
    }

    async fn register_events(
        &self,
        device_id: &str,
        registrations: &[EventRegistration],
    ) -> Result<()> {
        self.put_characteristics(device_id, registrations.to_vec()).await
    }
}
