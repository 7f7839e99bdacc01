//! Android devices through the Android Debug Bridge

use async_trait::async_trait;
use hive_core::{AttachedDevice, DeviceError, DeviceSource, HardwareIds, LocalDevice};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::command::{default_timeout, device_failure, run, run_for_device};

/// Device source for Android devices visible to `adb`
#[derive(Debug, Clone)]
pub struct AdbSource {
    adb: String,
    timeout: Duration,
}

impl Default for AdbSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AdbSource {
    pub fn new() -> Self {
        Self {
            adb: "adb".to_string(),
            timeout: default_timeout(),
        }
    }

    async fn wifi_mac(&self, serial: &str) -> Option<String> {
        match run_for_device(
            serial,
            &self.adb,
            &["-s", serial, "shell", "cat", "/sys/class/net/wlan0/address"],
            self.timeout,
        )
        .await
        {
            Ok(out) => Some(out.trim().to_string()).filter(|mac| mac.contains(':')),
            Err(e) => {
                debug!(serial = %serial, error = %e, "No Wi-Fi address");
                None
            }
        }
    }
}

#[async_trait]
impl DeviceSource for AdbSource {
    async fn attached(&self) -> Result<Vec<AttachedDevice>, DeviceError> {
        let output = run(&self.adb, &["devices"], self.timeout).await?;
        if !output.success {
            return Err(DeviceError::Command(format!(
                "adb devices failed: {}",
                output.message()
            )));
        }
        Ok(parse_devices(&output.stdout))
    }

    async fn inspect(&self, serial: &str) -> Result<LocalDevice, DeviceError> {
        let output = run(&self.adb, &["-s", serial, "shell", "getprop"], self.timeout).await?;
        if !output.success {
            let message = output.message();
            if is_unauthorized(&message) {
                return Ok(LocalDevice::untrusted(serial));
            }
            return Err(device_failure(serial, &self.adb, &message));
        }
        let mut device = device_from_props(serial, &parse_props(&output.stdout))?;
        device.hardware_ids.wifi_mac = self.wifi_mac(serial).await;
        Ok(device)
    }
}

/// `adb` refuses commands once USB debugging authorization is revoked
fn is_unauthorized(message: &str) -> bool {
    message.to_ascii_lowercase().contains("device unauthorized")
}

/// Parse `adb devices`
///
/// `device` is a trusted device, `unauthorized` is waiting for the debugging
/// prompt. Any other state (offline, recovery, no permissions) is not usable
/// and is left out.
pub fn parse_devices(output: &str) -> Vec<AttachedDevice> {
    output
        .lines()
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            match parts.next()? {
                "device" => Some(AttachedDevice::new(serial, true)),
                "unauthorized" => Some(AttachedDevice::new(serial, false)),
                state => {
                    debug!(serial = %serial, state = %state, "Skipping device");
                    None
                }
            }
        })
        .collect()
}

/// Parse `getprop` output: `[key]: [value]`
pub fn parse_props(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once("]: [")?;
            let key = key.trim().strip_prefix('[')?;
            let value = value.trim().strip_suffix(']')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

pub fn device_from_props(
    serial: &str,
    props: &HashMap<String, String>,
) -> Result<LocalDevice, DeviceError> {
    let prop = |key: &str| props.get(key).filter(|v| !v.is_empty()).cloned();
    let required = |key: &str| {
        prop(key).ok_or_else(|| DeviceError::InvalidOutput(format!("{} missing {}", serial, key)))
    };

    let is_tablet = prop("ro.build.characteristics")
        .map(|c| c.split(',').any(|c| c == "tablet"))
        .unwrap_or(false);

    Ok(LocalDevice {
        serial: serial.to_string(),
        trusted: true,
        name: prop("persist.sys.device_name").or_else(|| prop("ro.product.marketname")),
        brand: prop("ro.product.brand"),
        model: required("ro.product.model")?,
        os_version: required("ro.build.version.release")?,
        device_type: (if is_tablet { "Tablet" } else { "Phone" }).to_string(),
        device_class: prop("ro.product.device").unwrap_or_default(),
        hardware_ids: HardwareIds::default(),
    })
}
