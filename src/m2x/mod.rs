//! M2X device directory and command transport.
//!
//! Devices, their metadata and their data streams are owned by M2X; this
//! module only searches the directory, appends stream values and sends
//! commands on behalf of the processing passes.

use anyhow::Result;
use mockall::automock;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

const API_KEY_HEADER: &str = "X-M2X-KEY";

/// Minimum spacing between consecutive M2X requests. This is the remote
/// service's throughput policy, not a performance knob.
const REQUEST_SPACING: Duration = Duration::from_secs(1);

/// Opaque device handle as returned by directory searches.
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    values: Vec<StreamValue>,
}

#[derive(Debug, Deserialize)]
struct StreamValue {
    value: Value,
}

/// Directory and command operations consumed by the processing passes.
///
/// Abstracted for easier testing with mocks.
#[automock]
pub trait DeviceApi {
    /// Devices whose metadata field `key` matches `value` exactly.
    async fn search_by_metadata(&self, key: &str, value: &str) -> Result<Vec<Device>>;

    /// Devices whose named stream's latest value matches `value`.
    async fn search_by_stream_value(&self, stream: &str, value: &str) -> Result<Vec<Device>>;

    /// Latest value of a device stream, if the stream has any.
    async fn latest_stream_value(&self, device_id: &str, stream: &str)
        -> Result<Option<String>>;

    /// Append a value to a device stream, creating the stream if absent.
    async fn append_stream_value(&self, device_id: &str, stream: &str, value: &str)
        -> Result<()>;

    /// Send a named command to the given devices. Empty target lists are a
    /// no-op and send nothing.
    async fn send_command(&self, name: &str, data: Value, device_ids: Vec<String>) -> Result<()>;
}

/// Paces requests so consecutive calls stay at least `spacing` apart.
struct Pacer {
    spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut slot = self.next_slot.lock().await;
        if let Some(at) = *slot {
            let now = Instant::now();
            if at > now {
                tokio::time::sleep(at - now).await;
            }
        }
        *slot = Some(Instant::now() + self.spacing);
    }
}

/// M2X v2 REST client.
pub struct M2xClient {
    base_url: String,
    api_key: String,
    http: Client,
    pacer: Pacer,
}

impl M2xClient {
    pub fn new(base_url: &str, api_key: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
            pacer: Pacer::new(REQUEST_SPACING),
        }
    }

    async fn search(&self, filter: Value) -> Result<Vec<Device>> {
        self.pacer.wait().await;
        let url = format!("{}/devices/search", self.base_url);
        let response: SearchResponse = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&filter)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Directory search returned {} devices", response.devices.len());
        Ok(response.devices)
    }

    async fn put_stream_value(&self, device_id: &str, stream: &str, value: &str) -> Result<reqwest::Response> {
        self.pacer.wait().await;
        let url = format!(
            "{}/devices/{}/streams/{}/value",
            self.base_url, device_id, stream
        );
        let response = self
            .http
            .put(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({ "value": value }))
            .send()
            .await?;
        Ok(response)
    }

    async fn create_stream(&self, device_id: &str, stream: &str) -> Result<()> {
        self.pacer.wait().await;
        info!("Creating missing stream {} on device {}", stream, device_id);
        let url = format!("{}/devices/{}/streams/{}", self.base_url, device_id, stream);
        self.http
            .put(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({}))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl DeviceApi for M2xClient {
    async fn search_by_metadata(&self, key: &str, value: &str) -> Result<Vec<Device>> {
        self.search(json!({ "metadata": { (key): { "match": value } } }))
            .await
    }

    async fn search_by_stream_value(&self, stream: &str, value: &str) -> Result<Vec<Device>> {
        self.search(json!({ "streams": { (stream): { "match": value } } }))
            .await
    }

    async fn latest_stream_value(
        &self,
        device_id: &str,
        stream: &str,
    ) -> Result<Option<String>> {
        self.pacer.wait().await;
        let url = format!(
            "{}/devices/{}/streams/{}/values",
            self.base_url, device_id, stream
        );
        let response: ValuesResponse = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.values.into_iter().next().and_then(|v| match v.value {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }))
    }

    async fn append_stream_value(&self, device_id: &str, stream: &str, value: &str) -> Result<()> {
        let response = self.put_stream_value(device_id, stream, value).await?;
        if response.status() == StatusCode::NOT_FOUND {
            self.create_stream(device_id, stream).await?;
            self.put_stream_value(device_id, stream, value)
                .await?
                .error_for_status()?;
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }

    async fn send_command(&self, name: &str, data: Value, device_ids: Vec<String>) -> Result<()> {
        if device_ids.is_empty() {
            return Ok(());
        }
        self.pacer.wait().await;
        info!("Sending {} to {} devices", name, device_ids.len());
        let url = format!("{}/commands", self.base_url);
        self.http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({
                "name": name,
                "data": data,
                "targets": { "devices": device_ids }
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
