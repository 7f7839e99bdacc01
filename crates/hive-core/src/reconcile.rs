//! Reconciliation of attached devices with the fleet registry
//!
//! One pass fetches the registry snapshot, matches it against the attached
//! devices and then, in order:
//! 1. refreshes the OS version of matched records that drifted,
//! 2. polls every matched record in a single batch,
//! 3. registers and connects trusted devices the registry does not know.
//!
//! Every per-device step is isolated: a device that vanishes or is rejected
//! is logged and left out of the result, the rest of the pass continues.
//! Only an uninterpretable snapshot (or a device source that cannot
//! enumerate at all) fails the pass. When the registry is unavailable the
//! pass is delegated to [`crate::fallback`].

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::device::{AttachedDevice, LocalDevice, ReconciledDevice, RecordId, RemoteRecord};
use crate::fallback;
use crate::handle::{DeviceHandle, HandleError, HandleFactory};
use crate::matcher::{match_devices, MatchedPair};
use crate::registry::{RecordUpdate, Registration, RegistryClient, RegistryError};
use crate::snapshot::{DetectionError, Snapshot};
use crate::source::{DeviceError, DeviceSource};

/// Errors that abort a whole pass
#[derive(Error, Debug)]
pub enum PassError {
    #[error("Device detection failed: {0}")]
    Detection(#[from] DetectionError),
    #[error("Device enumeration failed: {0}")]
    Source(#[source] DeviceError),
}

/// How a single device failed to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The device disconnected between enumeration and use
    Vanished,
    /// Any other failure
    Other,
}

/// A contained, per-device failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{serial}: {message}")]
pub struct DeviceFailure {
    pub serial: String,
    pub kind: FailureKind,
    pub message: String,
}

impl DeviceFailure {
    pub fn other(serial: &str, message: impl Into<String>) -> Self {
        Self {
            serial: serial.to_string(),
            kind: FailureKind::Other,
            message: message.into(),
        }
    }

    pub fn from_device(serial: &str, err: DeviceError) -> Self {
        let kind = if err.is_not_found() {
            FailureKind::Vanished
        } else {
            FailureKind::Other
        };
        Self {
            serial: serial.to_string(),
            kind,
            message: err.to_string(),
        }
    }

    pub fn from_registry(serial: &str, err: RegistryError) -> Self {
        Self::other(serial, err.to_string())
    }

    pub fn from_handle(serial: &str, err: HandleError) -> Self {
        Self::other(serial, err.to_string())
    }
}

/// Counters describing one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// The registry was unavailable and devices were enumerated locally
    pub fallback: bool,
    pub matched: usize,
    pub updated: usize,
    pub polled: usize,
    pub registered: usize,
    /// Registered devices that are no longer attached
    pub missing: usize,
    pub vanished: usize,
    pub failed: usize,
}

impl PassReport {
    pub(crate) fn record_failure(&mut self, failure: &DeviceFailure) {
        match failure.kind {
            FailureKind::Vanished => {
                warn!(serial = %failure.serial, "Device disconnected before it could be used");
                self.vanished += 1;
            }
            FailureKind::Other => {
                warn!(serial = %failure.serial, error = %failure.message, "Error with connected device");
                self.failed += 1;
            }
        }
    }
}

/// Handles produced by a pass, matched devices first
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub handles: Vec<DeviceHandle>,
    pub report: PassReport,
}

/// Reconciliation engine for one platform
pub struct Reconciler {
    registry: Arc<dyn RegistryClient>,
    source: Arc<dyn DeviceSource>,
    factory: HandleFactory,
    options: BTreeMap<String, Value>,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        source: Arc<dyn DeviceSource>,
        factory: HandleFactory,
        options: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            registry,
            source,
            factory,
            options,
        }
    }

    /// Run one reconciliation pass
    pub async fn run_pass(&self) -> Result<PassOutcome, PassError> {
        let records = match self.registry.fetch_snapshot().await? {
            Snapshot::Unavailable { reason } => {
                info!(reason = %reason, "No Hive Mind connection, enumerating devices locally");
                return fallback::enumerate(self.source.as_ref(), &self.factory, &self.options)
                    .await;
            }
            Snapshot::Available { records } => records,
        };

        let attached = self.source.attached().await.map_err(PassError::Source)?;
        if attached.is_empty() {
            debug!("No devices attached");
        }

        let platform = self.factory.platform();
        let matches = match_devices(platform, &records, &attached)?;
        let mut report = PassReport {
            matched: matches.matched.len(),
            missing: matches.unmatched_remote.len(),
            ..Default::default()
        };

        for remote in &matches.unmatched_remote {
            debug!(serial = %remote.serial, id = %remote.id, "A previously registered device has disappeared");
        }

        let mut handles = Vec::new();
        let mut to_poll = Vec::new();

        for pair in &matches.matched {
            match self.reconcile_matched(pair, &mut to_poll, &mut report).await {
                Ok(handle) => handles.push(handle),
                Err(failure) => report.record_failure(&failure),
            }
        }

        if !to_poll.is_empty() {
            debug!(ids = ?to_poll, "Polling registered devices");
            match self.registry.poll(&to_poll).await {
                Ok(()) => report.polled = to_poll.len(),
                Err(e) => warn!(error = %e, count = to_poll.len(), "Failed to poll devices"),
            }
        }

        for device in &matches.unmatched_local {
            match self.register_device(device).await {
                Ok(handle) => {
                    report.registered += 1;
                    handles.push(handle);
                }
                Err(failure) => report.record_failure(&failure),
            }
        }

        info!(
            attached = handles.len(),
            matched = report.matched,
            updated = report.updated,
            registered = report.registered,
            missing = report.missing,
            vanished = report.vanished,
            failed = report.failed,
            "Reconciliation pass complete"
        );

        Ok(PassOutcome { handles, report })
    }

    /// Refresh a matched record and build its handle
    ///
    /// The record id joins the poll batch as soon as the device is confirmed
    /// present and still trusted, even if the version update or handle
    /// construction then fails.
    async fn reconcile_matched(
        &self,
        pair: &MatchedPair,
        to_poll: &mut Vec<RecordId>,
        report: &mut PassReport,
    ) -> Result<DeviceHandle, DeviceFailure> {
        let serial = pair.local.serial.as_str();
        let remote = &pair.remote;

        let local = inspect_trusted(self.source.as_ref(), serial).await?;
        to_poll.push(remote.id.clone());

        debug!(serial = %serial, os_version = %local.os_version, "Registered device attached");

        if remote.os_version.as_deref() != Some(local.os_version.as_str()) {
            info!(
                serial = %serial,
                id = %remote.id,
                from = remote.os_version.as_deref().unwrap_or("unknown"),
                to = %local.os_version,
                "Updating OS version"
            );
            let update = RecordUpdate::os_version(self.factory.platform(), local.os_version.clone());
            self.registry
                .update_record(&remote.id, &update)
                .await
                .map_err(|e| DeviceFailure::from_registry(serial, e))?;
            report.updated += 1;
        }

        let reconciled =
            ReconciledDevice::from_record(self.factory.platform(), remote, &local, &self.options);
        self.factory
            .build(&reconciled)
            .map_err(|e| DeviceFailure::from_handle(serial, e))
    }

    /// Register an unknown trusted device, connect it and build its handle
    async fn register_device(&self, device: &AttachedDevice) -> Result<DeviceHandle, DeviceFailure> {
        let serial = device.serial.as_str();
        let platform = self.factory.platform();

        let local = inspect_trusted(self.source.as_ref(), serial).await?;

        let registration = Registration::for_device(platform, &local);
        let id = self
            .registry
            .register(&registration)
            .await
            .map_err(|e| DeviceFailure::from_registry(serial, e))?;
        self.registry
            .connect(&id)
            .await
            .map_err(|e| DeviceFailure::from_registry(serial, e))?;
        info!(serial = %serial, id = %id, model = %local.model, "Device registered");

        let record = RemoteRecord {
            id,
            serial: local.serial.clone(),
            os_name: platform.os_name().to_string(),
            os_version: Some(local.os_version.clone()),
            display_name: None,
        };
        let reconciled = ReconciledDevice::from_record(platform, &record, &local, &self.options);
        self.factory
            .build(&reconciled)
            .map_err(|e| DeviceFailure::from_handle(serial, e))
    }
}

/// Read a device's attributes, refusing one whose trust was revoked
/// after enumeration
pub(crate) async fn inspect_trusted(
    source: &dyn DeviceSource,
    serial: &str,
) -> Result<LocalDevice, DeviceFailure> {
    let local = source
        .inspect(serial)
        .await
        .map_err(|e| DeviceFailure::from_device(serial, e))?;
    if !local.trusted {
        return Err(DeviceFailure::other(serial, "device is no longer trusted"));
    }
    Ok(local)
}
