//! Device handles given to workers

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{DeviceStatus, Platform, ReconciledDevice, RecordId};

/// Option naming the prefix of every worker queue
pub const QUEUE_PREFIX_OPTION: &str = "queue_prefix";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HandleError {
    #[error("Missing device attribute: {0}")]
    MissingAttribute(&'static str),
    #[error("Device {serial} is {actual}, factory builds {expected} devices")]
    PlatformMismatch {
        serial: String,
        expected: Platform,
        actual: Platform,
    },
    #[error("Invalid option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },
}

/// Runtime device object handed to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub id: RecordId,
    pub serial: String,
    pub platform: Platform,
    pub name: Option<String>,
    pub brand: String,
    pub model: String,
    pub os_version: String,
    pub device_class: String,
    pub status: DeviceStatus,
    /// Job queues this device's worker listens on
    pub queues: Vec<String>,
    pub options: std::collections::BTreeMap<String, serde_json::Value>,
}

impl DeviceHandle {
    /// Name used in logs, falling back to the serial
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.serial)
    }
}

/// Builds device handles for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleFactory {
    platform: Platform,
}

impl HandleFactory {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn build(&self, device: &ReconciledDevice) -> Result<DeviceHandle, HandleError> {
        if device.serial.is_empty() {
            return Err(HandleError::MissingAttribute("serial"));
        }
        if device.id.as_str().is_empty() {
            return Err(HandleError::MissingAttribute("id"));
        }
        if device.platform != self.platform {
            return Err(HandleError::PlatformMismatch {
                serial: device.serial.clone(),
                expected: self.platform,
                actual: device.platform,
            });
        }

        let prefix = match device.options.get(QUEUE_PREFIX_OPTION) {
            None => "",
            Some(serde_json::Value::String(prefix)) => prefix.as_str(),
            Some(other) => {
                return Err(HandleError::InvalidOption {
                    name: QUEUE_PREFIX_OPTION.to_string(),
                    reason: format!("expected a string, got {}", other),
                })
            }
        };

        let mut queues = Vec::with_capacity(2);
        if !device.model.is_empty() {
            queues.push(format!("{}{}", prefix, device.model));
        }
        queues.push(format!(
            "{}{}-{}",
            prefix,
            self.platform.os_name(),
            device.os_version
        ));

        Ok(DeviceHandle {
            id: device.id.clone(),
            serial: device.serial.clone(),
            platform: device.platform,
            name: device.name.clone(),
            brand: device.brand.clone(),
            model: device.model.clone(),
            os_version: device.os_version.clone(),
            device_class: device.device_class.clone(),
            status: device.status,
            queues,
            options: device.options.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn reconciled(serial: &str) -> ReconciledDevice {
        ReconciledDevice {
            id: RecordId::from(1),
            serial: serial.to_string(),
            platform: Platform::Ios,
            name: None,
            brand: "Apple".to_string(),
            model: "iPad8,1".to_string(),
            os_version: "15.0".to_string(),
            device_class: "iPad".to_string(),
            status: DeviceStatus::Connected,
            options: BTreeMap::new(),
        }
    }

    #[test]
    fn test_build_derives_queues() {
        let mut device = reconciled("A");
        device
            .options
            .insert(QUEUE_PREFIX_OPTION.to_string(), json!("hive-"));

        let handle = HandleFactory::new(Platform::Ios).build(&device).unwrap();
        assert_eq!(handle.queues, vec!["hive-iPad8,1", "hive-ios-15.0"]);
        assert_eq!(handle.display_name(), "A");
    }

    #[test]
    fn test_build_rejects_missing_serial() {
        let err = HandleFactory::new(Platform::Ios)
            .build(&reconciled(""))
            .unwrap_err();
        assert_eq!(err, HandleError::MissingAttribute("serial"));
    }

    #[test]
    fn test_build_rejects_other_platform() {
        let err = HandleFactory::new(Platform::Android)
            .build(&reconciled("A"))
            .unwrap_err();
        assert!(matches!(err, HandleError::PlatformMismatch { .. }));
    }

    #[test]
    fn test_build_rejects_non_string_prefix() {
        let mut device = reconciled("A");
        device.options.insert(QUEUE_PREFIX_OPTION.to_string(), json!(3));
        assert!(HandleFactory::new(Platform::Ios).build(&device).is_err());
    }
}
