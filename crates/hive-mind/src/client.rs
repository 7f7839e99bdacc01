//! HTTP client for the Hive Mind API

use async_trait::async_trait;
use hive_core::{
    DetectionError, RecordId, RecordUpdate, Registration, RegistryClient, RegistryError, Snapshot,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::hive::HiveIdentity;
use crate::payload::{
    register_body, ConnectRequest, Connection, HiveDevice, Poll, PollRequest, RegisterRequest,
    RegisteredRecord, UpdateDevice,
};

/// Default timeout for registry requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Hive Mind client acting on behalf of one hive
pub struct HiveMindClient {
    client: reqwest::Client,
    base_url: String,
    hive_id: Option<RecordId>,
}

impl HiveMindClient {
    /// Create a client for the registry at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Unreachable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            hive_id: None,
        })
    }

    pub fn with_hive_id(mut self, hive_id: RecordId) -> Self {
        self.hive_id = Some(hive_id);
        self
    }

    pub fn hive_id(&self) -> Option<&RecordId> {
        self.hive_id.as_ref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn require_hive_id(&self) -> Result<&RecordId, RegistryError> {
        self.hive_id.as_ref().ok_or(RegistryError::NotRegistered)
    }

    /// Register this hive and remember the id the registry assigns
    pub async fn register_hive(&mut self, identity: &HiveIdentity) -> Result<RecordId, RegistryError> {
        let body = RegisterRequest {
            device: &HiveDevice::new(identity),
        };
        let record: RegisteredRecord = self
            .send_json(reqwest::Method::POST, "/api/devices/register.json", &body)
            .await?;
        info!(hostname = %identity.hostname, id = %record.id, "Hive registered with Hive Mind");
        self.hive_id = Some(record.id.clone());
        Ok(record.id)
    }

    /// Send a JSON body and decode the JSON response
    async fn send_json<B, R>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<R, RegistryError>
    where
        B: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let response = self.send(method, path, body).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))
    }

    /// Send a JSON body and check the status
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, RegistryError> {
        let url = self.url(path);
        debug!(method = %method, url = %url, "Hive Mind request");

        let response = self
            .client
            .request(method, &url)
            .json(body)
            .send()
            .await
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RegistryClient for HiveMindClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, DetectionError> {
        let Some(hive_id) = self.hive_id.as_ref() else {
            return Ok(Snapshot::unavailable("hive is not registered"));
        };

        let url = self.url(&format!("/api/devices/{}.json", hive_id));
        debug!(url = %url, "Fetching hive details");

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to reach Hive Mind");
                return Ok(Snapshot::unavailable(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Hive Mind returned non-success status");
            return Ok(Snapshot::unavailable(format!("HTTP {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DetectionError::Malformed(e.to_string()))?;
        Snapshot::from_response(body)
    }

    async fn register(&self, registration: &Registration) -> Result<RecordId, RegistryError> {
        let record: RegisteredRecord = self
            .send_json(
                reqwest::Method::POST,
                "/api/devices/register.json",
                &register_body(registration),
            )
            .await?;
        Ok(record.id)
    }

    async fn connect(&self, id: &RecordId) -> Result<(), RegistryError> {
        let hive_id = self.require_hive_id()?;
        let body = ConnectRequest {
            connection: Connection {
                hive_id,
                device_id: id,
            },
        };
        self.send(reqwest::Method::PUT, "/api/plugin/hive/connect.json", &body)
            .await?;
        Ok(())
    }

    async fn poll(&self, ids: &[RecordId]) -> Result<(), RegistryError> {
        let hive_id = self.require_hive_id()?;
        let body = PollRequest {
            poll: Poll {
                id: hive_id,
                devices: ids,
            },
        };
        self.send(reqwest::Method::PUT, "/api/devices/poll.json", &body)
            .await?;
        Ok(())
    }

    async fn update_record(&self, id: &RecordId, update: &RecordUpdate) -> Result<(), RegistryError> {
        let body = RegisterRequest {
            device: &UpdateDevice { id, update },
        };
        self.send(reqwest::Method::POST, "/api/devices/register.json", &body)
            .await?;
        Ok(())
    }
}

/// Registry stand-in used when Hive Mind is disabled in configuration
///
/// Every snapshot is unavailable, so passes always enumerate locally.
#[derive(Debug, Clone)]
pub struct OfflineRegistry {
    reason: String,
}

impl OfflineRegistry {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RegistryClient for OfflineRegistry {
    async fn fetch_snapshot(&self) -> Result<Snapshot, DetectionError> {
        Ok(Snapshot::unavailable(self.reason.clone()))
    }

    async fn register(&self, _registration: &Registration) -> Result<RecordId, RegistryError> {
        Err(RegistryError::NotRegistered)
    }

    async fn connect(&self, _id: &RecordId) -> Result<(), RegistryError> {
        Err(RegistryError::NotRegistered)
    }

    async fn poll(&self, _ids: &[RecordId]) -> Result<(), RegistryError> {
        Err(RegistryError::NotRegistered)
    }

    async fn update_record(&self, _id: &RecordId, _update: &RecordUpdate) -> Result<(), RegistryError> {
        Err(RegistryError::NotRegistered)
    }
}
