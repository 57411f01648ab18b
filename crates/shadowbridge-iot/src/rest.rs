//! SigV4-signed REST client for the registry and shadow services.
//!
//! Registry operations go to the regional control-plane endpoint; shadow
//! updates go to the account's data endpoint. Each request is signed with
//! the header variant of [`crate::sign`]. HTTP 409 (or a
//! `ResourceAlreadyExistsException` body) maps to the distinct
//! already-exists error so callers can absorb idempotency conflicts.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::debug;

use shadowbridge_core::error::{Error, Result};

use crate::cloud::{ShadowClient, ThingRecord, ThingRegistryClient};
use crate::shadow::ShadowDocument;
use crate::sign::{sign_headers, SigningCredentials, CONTROL_PLANE_SERVICE, DATA_PLANE_SERVICE};

const ALREADY_EXISTS_MARKER: &str = "ResourceAlreadyExistsException";

/// REST client for the remote thing registry and shadow service.
pub struct IotRestClient {
    http: reqwest::Client,
    region: String,
    /// Regional control-plane host (`iot.<region>.amazonaws.com`).
    control_host: String,
    /// Account data endpoint host.
    data_host: String,
    credentials: SigningCredentials,
}

impl IotRestClient {
    pub fn new(region: impl Into<String>, data_host: impl Into<String>, credentials: SigningCredentials) -> Self {
        let region = region.into();
        let control_host = format!("iot.{}.amazonaws.com", region);
        Self {
            http: reqwest::Client::new(),
            region,
            control_host,
            data_host: data_host.into(),
            credentials,
        }
    }

    async fn send(
        &self,
        op: &'static str,
        method: Method,
        host: &str,
        service: &str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<()> {
        let signed = sign_headers(
            method.as_str(),
            host,
            path,
            "",
            service,
            &self.region,
            &self.credentials,
            &body,
            Utc::now(),
        );
        let url = format!("https://{}{}", host, path);
        let response = self
            .http
            .request(method, &url)
            .header("authorization", &signed.authorization)
            .header("x-amz-date", &signed.amz_date)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Registry {
                op,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(op, %status, "registry call succeeded");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::CONFLICT || text.contains(ALREADY_EXISTS_MARKER) {
            return Err(Error::ThingAlreadyExists(path.to_string()));
        }
        Err(Error::Registry {
            op,
            message: format!("{}: {}", status, text),
        })
    }

    fn control_path(segment: &str, name: &str) -> String {
        format!("/{}/{}", segment, urlencoding::encode(name))
    }
}

#[async_trait]
impl ThingRegistryClient for IotRestClient {
    async fn create_thing_type(&self, name: &str) -> Result<()> {
        self.send(
            "create_thing_type",
            Method::POST,
            &self.control_host,
            CONTROL_PLANE_SERVICE,
            &Self::control_path("thing-types", name),
            b"{}".to_vec(),
        )
        .await
    }

    async fn create_thing_group(&self, name: &str) -> Result<()> {
        self.send(
            "create_thing_group",
            Method::POST,
            &self.control_host,
            CONTROL_PLANE_SERVICE,
            &Self::control_path("thing-groups", name),
            b"{}".to_vec(),
        )
        .await
    }

    async fn create_thing(&self, record: &ThingRecord) -> Result<()> {
        let body = json!({
            "thingTypeName": record.thing_type,
            "attributePayload": {"attributes": record.attributes},
        });
        self.send(
            "create_thing",
            Method::POST,
            &self.control_host,
            CONTROL_PLANE_SERVICE,
            &Self::control_path("things", &record.thing_name),
            body.to_string().into_bytes(),
        )
        .await
    }

    async fn update_thing(&self, record: &ThingRecord) -> Result<()> {
        let body = json!({
            "thingTypeName": record.thing_type,
            "attributePayload": {"attributes": record.attributes},
        });
        self.send(
            "update_thing",
            Method::PATCH,
            &self.control_host,
            CONTROL_PLANE_SERVICE,
            &Self::control_path("things", &record.thing_name),
            body.to_string().into_bytes(),
        )
        .await
    }

    async fn add_thing_to_group(&self, thing_name: &str, group_name: &str) -> Result<()> {
        let body = json!({
            "thingName": thing_name,
            "thingGroupName": group_name,
        });
        self.send(
            "add_thing_to_group",
            Method::PUT,
            &self.control_host,
            CONTROL_PLANE_SERVICE,
            "/thing-groups/addThingToThingGroup",
            body.to_string().into_bytes(),
        )
        .await
    }
}

#[async_trait]
impl ShadowClient for IotRestClient {
    async fn update_shadow(&self, thing_id: &str, document: &ShadowDocument) -> Result<()> {
        let body = serde_json::to_vec(document).map_err(|e| Error::Shadow {
            thing_id: thing_id.to_string(),
            message: e.to_string(),
        })?;
        debug!(thing_id, "updating shadow");
        self.send(
            "update_shadow",
            Method::POST,
            &self.data_host,
            DATA_PLANE_SERVICE,
            &format!("/things/{}/shadow", urlencoding::encode(thing_id)),
            body,
        )
        .await
        .map_err(|e| match e {
            Error::Registry { message, .. } => Error::Shadow {
                thing_id: thing_id.to_string(),
                message,
            },
            other => other,
        })
    }
}
