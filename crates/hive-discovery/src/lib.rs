//! Hive Discovery - Enumeration of devices attached to the hive
//!
//! This crate provides device sources backed by the platform tools:
//! - libimobiledevice (`idevice_id`, `idevicepair`, `ideviceinfo`) for iOS
//! - Android Debug Bridge (`adb`) for Android

pub mod adb;
pub mod command;
pub mod idevice;

pub use adb::AdbSource;
pub use idevice::IdeviceSource;

use hive_core::{DeviceSource, Platform};
use std::sync::Arc;

/// Device source for the platform a controller manages
pub fn source_for(platform: Platform) -> Arc<dyn DeviceSource> {
    match platform {
        Platform::Ios => Arc::new(IdeviceSource::new()),
        Platform::Android => Arc::new(AdbSource::new()),
    }
}
