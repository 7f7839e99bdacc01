//! iOS devices through libimobiledevice

use async_trait::async_trait;
use hive_core::{AttachedDevice, DeviceError, DeviceSource, HardwareIds, LocalDevice};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::command::{default_timeout, is_vanished_message, run, run_for_device};

/// Device source for iOS devices attached over USB
#[derive(Debug, Clone)]
pub struct IdeviceSource {
    idevice_id: String,
    idevicepair: String,
    ideviceinfo: String,
    timeout: Duration,
}

impl Default for IdeviceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdeviceSource {
    pub fn new() -> Self {
        Self {
            idevice_id: "idevice_id".to_string(),
            idevicepair: "idevicepair".to_string(),
            ideviceinfo: "ideviceinfo".to_string(),
            timeout: default_timeout(),
        }
    }

    /// Use tools from `dir` instead of `PATH`
    pub fn with_tool_dir(dir: &std::path::Path, timeout: Duration) -> Self {
        let tool = |name: &str| dir.join(name).to_string_lossy().into_owned();
        Self {
            idevice_id: tool("idevice_id"),
            idevicepair: tool("idevicepair"),
            ideviceinfo: tool("ideviceinfo"),
            timeout,
        }
    }

    /// Check whether the host is paired with the device
    ///
    /// Returns `None` when the device disappeared while checking.
    async fn is_trusted(&self, udid: &str) -> Result<Option<bool>, DeviceError> {
        let output = run(&self.idevicepair, &["-u", udid, "validate"], self.timeout).await?;
        if output.success {
            return Ok(Some(true));
        }
        let message = output.message();
        if is_vanished_message(&message) {
            return Ok(None);
        }
        debug!(serial = %udid, message = %message, "Device is not trusted");
        Ok(Some(false))
    }
}

#[async_trait]
impl DeviceSource for IdeviceSource {
    async fn attached(&self) -> Result<Vec<AttachedDevice>, DeviceError> {
        let output = run(&self.idevice_id, &["-l"], self.timeout).await?;
        if !output.success {
            return Err(DeviceError::Command(format!(
                "idevice_id failed: {}",
                output.message()
            )));
        }

        let mut devices = Vec::new();
        for udid in parse_udids(&output.stdout) {
            match self.is_trusted(&udid).await {
                Ok(Some(trusted)) => devices.push(AttachedDevice::new(udid, trusted)),
                Ok(None) => warn!(serial = %udid, "Device disconnected during enumeration"),
                Err(e) => warn!(serial = %udid, error = %e, "Could not check pairing, skipping device"),
            }
        }
        Ok(devices)
    }

    async fn inspect(&self, serial: &str) -> Result<LocalDevice, DeviceError> {
        match self.is_trusted(serial).await? {
            Some(true) => {}
            Some(false) => return Ok(LocalDevice::untrusted(serial)),
            None => return Err(DeviceError::NotFound(serial.to_string())),
        }
        let stdout =
            run_for_device(serial, &self.ideviceinfo, &["-u", serial], self.timeout).await?;
        device_from_info(serial, &parse_info(&stdout))
    }
}

/// Parse `idevice_id -l`, one UDID per line
///
/// Devices attached over USB and the network are listed twice.
pub fn parse_udids(output: &str) -> Vec<String> {
    let mut udids: Vec<String> = Vec::new();
    for line in output.lines() {
        let udid = line.split_whitespace().next().unwrap_or_default();
        if !udid.is_empty() && !udids.iter().any(|u| u == udid) {
            udids.push(udid.to_string());
        }
    }
    udids
}

/// Parse the `Key: Value` output of `ideviceinfo`
pub fn parse_info(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter(|line| !line.starts_with(' '))
        .filter_map(|line| line.split_once(": "))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

fn device_type(device_class: &str) -> &'static str {
    match device_class {
        "iPhone" => "Phone",
        "iPad" => "Tablet",
        _ => "Other",
    }
}

fn non_empty(info: &HashMap<String, String>, key: &str) -> Option<String> {
    info.get(key).filter(|v| !v.is_empty()).cloned()
}

pub fn device_from_info(
    serial: &str,
    info: &HashMap<String, String>,
) -> Result<LocalDevice, DeviceError> {
    let required = |key: &str| {
        non_empty(info, key)
            .ok_or_else(|| DeviceError::InvalidOutput(format!("{} missing {}", serial, key)))
    };

    let device_class = required("DeviceClass")?;
    Ok(LocalDevice {
        serial: serial.to_string(),
        trusted: true,
        name: non_empty(info, "DeviceName"),
        brand: Some("Apple".to_string()),
        model: required("ProductType")?,
        os_version: required("ProductVersion")?,
        device_type: device_type(&device_class).to_string(),
        device_class,
        hardware_ids: HardwareIds {
            imei: non_empty(info, "InternationalMobileEquipmentIdentity"),
            wifi_mac: non_empty(info, "WiFiAddress"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "\
ActivationState: Activated
BasebandStatus: BBInfoAvailable
DeviceClass: iPhone
DeviceName: Test Lab 7
InternationalMobileEquipmentIdentity: 356789012345678
ProductType: iPhone12,1
ProductVersion: 15.0
SupportedDeviceFamilies:
 0: 1
WiFiAddress: a4:83:e7:00:11:22
";

    #[test]
    fn test_parse_udids_deduplicates() {
        let output = "00008030-001A\n00008030-001A (Network)\n\nabcdef0123\n";
        assert_eq!(parse_udids(output), vec!["00008030-001A", "abcdef0123"]);
        assert!(parse_udids("").is_empty());
    }

    #[test]
    fn test_device_from_info() {
        let device = device_from_info("00008030-001A", &parse_info(INFO)).unwrap();
        assert_eq!(device.model, "iPhone12,1");
        assert_eq!(device.os_version, "15.0");
        assert_eq!(device.device_class, "iPhone");
        assert_eq!(device.device_type, "Phone");
        assert_eq!(device.name.as_deref(), Some("Test Lab 7"));
        assert_eq!(device.hardware_ids.imei.as_deref(), Some("356789012345678"));
        assert_eq!(device.hardware_ids.wifi_mac.as_deref(), Some("a4:83:e7:00:11:22"));
    }

    #[test]
    fn test_ipad_without_imei() {
        let info = parse_info("DeviceClass: iPad\nProductType: iPad8,1\nProductVersion: 16.1\n");
        let device = device_from_info("X", &info).unwrap();
        assert_eq!(device.device_type, "Tablet");
        assert!(device.hardware_ids.imei.is_none());
    }

    #[cfg(unix)]
    fn write_tool(dir: &std::path::Path, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_pairing_check_skips_only_that_device() {
        let dir = tempfile::TempDir::new().unwrap();
        write_tool(dir.path(), "idevice_id", "printf 'GOOD\\nSLOW\\n'\n");
        write_tool(
            dir.path(),
            "idevicepair",
            "if [ \"$2\" = SLOW ]; then sleep 5; fi\necho \"SUCCESS: Validated pairing with device $2\"\n",
        );

        let source = IdeviceSource::with_tool_dir(dir.path(), Duration::from_millis(500));
        let attached = source.attached().await.unwrap();

        assert_eq!(attached, vec![AttachedDevice::new("GOOD", true)]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_inspect_reports_revoked_pairing() {
        let dir = tempfile::TempDir::new().unwrap();
        write_tool(
            dir.path(),
            "idevicepair",
            "echo \"ERROR: Device $2 is not paired with this host\"\nexit 1\n",
        );

        let source = IdeviceSource::with_tool_dir(dir.path(), Duration::from_secs(5));
        let device = source.inspect("LOCKED").await.unwrap();

        assert!(!device.trusted);
        assert_eq!(device.serial, "LOCKED");
    }

    #[test]
    fn test_missing_version_is_invalid() {
        let info = parse_info("DeviceClass: iPhone\nProductType: iPhone12,1\n");
        assert!(matches!(
            device_from_info("X", &info),
            Err(DeviceError::InvalidOutput(_))
        ));
    }
}
