//! Device types for attached hardware and fleet registry records

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Platform managed by a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    /// Operating system name as stored in Hive Mind
    pub fn os_name(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }

    /// Brand used when the device does not report one
    pub fn default_brand(&self) -> &'static str {
        match self {
            Self::Ios => "Apple",
            Self::Android => "Android",
        }
    }

    /// Check whether a registry OS name refers to this platform
    pub fn matches_os_name(&self, os_name: &str) -> bool {
        os_name.eq_ignore_ascii_case(self.os_name())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.os_name())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// Opaque registry identifier
///
/// Hive Mind hands out integer ids, while devices enumerated without the
/// registry use their serial. Numeric ids serialize back as JSON numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<u64>() {
            Ok(n) => serializer.serialize_u64(n),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self::from(n),
            Raw::Text(s) => Self(s),
        })
    }
}

/// Status reported to workers for a reconciled device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Device is attached and free for work
    #[default]
    Idle,
    /// Device is attached and known to the registry
    Connected,
}

/// A device as seen by enumeration, before any attribute is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedDevice {
    pub serial: String,
    /// Pairing/authorization handshake has completed
    pub trusted: bool,
}

impl AttachedDevice {
    pub fn new(serial: impl Into<String>, trusted: bool) -> Self {
        Self {
            serial: serial.into(),
            trusted,
        }
    }
}

/// Hardware identifiers used when registering a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareIds {
    pub imei: Option<String>,
    pub wifi_mac: Option<String>,
}

/// Full attribute read of an attached device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDevice {
    /// Host-unique serial (UDID for iOS, adb serial for Android)
    pub serial: String,
    pub trusted: bool,
    /// User-assigned device name, if the device reports one
    pub name: Option<String>,
    /// Manufacturer brand, if the device reports one
    pub brand: Option<String>,
    pub model: String,
    pub os_version: String,
    /// Device type, e.g. "Phone" or "Tablet"
    pub device_type: String,
    /// Device class/range, e.g. "iPhone"
    pub device_class: String,
    pub hardware_ids: HardwareIds,
}

impl LocalDevice {
    /// A device whose pairing was revoked; no other attribute can be read
    pub fn untrusted(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            trusted: false,
            name: None,
            brand: None,
            model: String::new(),
            os_version: String::new(),
            device_type: String::new(),
            device_class: String::new(),
            hardware_ids: HardwareIds::default(),
        }
    }
}

/// A device record held by the fleet registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RecordId,
    pub serial: String,
    #[serde(rename = "operating_system_name")]
    pub os_name: String,
    #[serde(rename = "operating_system_version", default)]
    pub os_version: Option<String>,
    #[serde(rename = "name", default)]
    pub display_name: Option<String>,
}

/// Merged view of a reconciled device, input to the handle factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledDevice {
    pub id: RecordId,
    pub serial: String,
    pub platform: Platform,
    pub name: Option<String>,
    pub brand: String,
    pub model: String,
    pub os_version: String,
    pub device_class: String,
    pub status: DeviceStatus,
    /// Pass-through configuration options
    pub options: BTreeMap<String, serde_json::Value>,
}

impl ReconciledDevice {
    /// Merge a registry record with the live attributes of its device
    pub fn from_record(
        platform: Platform,
        record: &RemoteRecord,
        local: &LocalDevice,
        options: &BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: record.id.clone(),
            serial: record.serial.clone(),
            platform,
            name: record.display_name.clone().or_else(|| local.name.clone()),
            brand: brand_of(platform, local),
            model: local.model.clone(),
            os_version: local.os_version.clone(),
            device_class: local.device_class.clone(),
            status: DeviceStatus::Connected,
            options: options.clone(),
        }
    }

    /// Build a device without registry involvement, using the serial as id
    pub fn from_local(
        platform: Platform,
        local: &LocalDevice,
        options: &BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: RecordId::new(local.serial.clone()),
            serial: local.serial.clone(),
            platform,
            name: local.name.clone(),
            brand: brand_of(platform, local),
            model: local.model.clone(),
            os_version: local.os_version.clone(),
            device_class: local.device_class.clone(),
            status: DeviceStatus::Idle,
            options: options.clone(),
        }
    }
}

pub(crate) fn brand_of(platform: Platform, local: &LocalDevice) -> String {
    local
        .brand
        .clone()
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| platform.default_brand().to_string())
}
