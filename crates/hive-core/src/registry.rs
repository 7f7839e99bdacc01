//! Fleet registry client interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{LocalDevice, Platform, RecordId};
use crate::snapshot::{DetectionError, Snapshot};

/// Plugin type reported for every device managed by a controller
pub const PLUGIN_TYPE: &str = "Mobile";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry not reachable: {0}")]
    Unreachable(String),
    #[error("Registry rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),
    #[error("Hive is not registered with the registry")]
    NotRegistered,
}

/// Payload registering a new device record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub hostname: String,
    pub serial: String,
    pub macs: Vec<String>,
    pub brand: String,
    pub model: String,
    pub device_type: String,
    pub plugin_type: String,
    pub imei: Option<String>,
    #[serde(rename = "operating_system_name")]
    pub os_name: String,
    #[serde(rename = "operating_system_version")]
    pub os_version: String,
}

impl Registration {
    /// Build the registration payload for an attached device
    pub fn for_device(platform: Platform, device: &LocalDevice) -> Self {
        Self {
            hostname: device.model.clone(),
            serial: device.serial.clone(),
            macs: device.hardware_ids.wifi_mac.iter().cloned().collect(),
            brand: crate::device::brand_of(platform, device),
            model: device.model.clone(),
            device_type: device.device_type.clone(),
            plugin_type: PLUGIN_TYPE.to_string(),
            imei: device.hardware_ids.imei.clone(),
            os_name: platform.os_name().to_string(),
            os_version: device.os_version.clone(),
        }
    }
}

/// Partial update of an existing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUpdate {
    #[serde(rename = "operating_system_name")]
    pub os_name: String,
    #[serde(rename = "operating_system_version")]
    pub os_version: String,
}

impl RecordUpdate {
    pub fn os_version(platform: Platform, version: impl Into<String>) -> Self {
        Self {
            os_name: platform.os_name().to_string(),
            os_version: version.into(),
        }
    }
}

/// Remote fleet registry
///
/// Implementations own their timeout and retry behaviour; callers never retry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the records currently attached to this hive
    async fn fetch_snapshot(&self) -> Result<Snapshot, DetectionError>;

    /// Register a new device, returning the id assigned by the registry
    async fn register(&self, registration: &Registration) -> Result<RecordId, RegistryError>;

    /// Mark a record as actively in use by this hive
    async fn connect(&self, id: &RecordId) -> Result<(), RegistryError>;

    /// Mark a batch of records as alive
    async fn poll(&self, ids: &[RecordId]) -> Result<(), RegistryError>;

    /// Partially update an existing record
    async fn update_record(&self, id: &RecordId, update: &RecordUpdate)
        -> Result<(), RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HardwareIds;
    use serde_json::json;

    #[test]
    fn test_registration_payload_shape() {
        let device = LocalDevice {
            serial: "B".to_string(),
            trusted: true,
            name: Some("Lab iPhone".to_string()),
            brand: None,
            model: "iPhone12,1".to_string(),
            os_version: "15.0".to_string(),
            device_type: "Phone".to_string(),
            device_class: "iPhone".to_string(),
            hardware_ids: HardwareIds {
                imei: Some("356789".to_string()),
                wifi_mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
            },
        };

        let payload = serde_json::to_value(Registration::for_device(Platform::Ios, &device)).unwrap();
        assert_eq!(
            payload,
            json!({
                "hostname": "iPhone12,1",
                "serial": "B",
                "macs": ["aa:bb:cc:dd:ee:ff"],
                "brand": "Apple",
                "model": "iPhone12,1",
                "device_type": "Phone",
                "plugin_type": "Mobile",
                "imei": "356789",
                "operating_system_name": "ios",
                "operating_system_version": "15.0"
            })
        );
    }

    #[test]
    fn test_registration_without_mac() {
        let device = LocalDevice {
            serial: "C".to_string(),
            trusted: true,
            name: None,
            brand: Some("google".to_string()),
            model: "Pixel 6".to_string(),
            os_version: "13".to_string(),
            device_type: "Phone".to_string(),
            device_class: "oriole".to_string(),
            hardware_ids: HardwareIds::default(),
        };

        let registration = Registration::for_device(Platform::Android, &device);
        assert!(registration.macs.is_empty());
        assert_eq!(registration.brand, "google");
        assert_eq!(registration.os_name, "android");
    }
}
