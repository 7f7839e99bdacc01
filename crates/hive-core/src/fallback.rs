//! Local enumeration used while the registry is unavailable

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::device::ReconciledDevice;
use crate::handle::{DeviceHandle, HandleFactory};
use crate::reconcile::{inspect_trusted, DeviceFailure, PassError, PassOutcome, PassReport};
use crate::source::DeviceSource;

/// Build handles for every trusted attached device without the registry
///
/// Each device is identified by its serial. Nothing is registered, polled or
/// updated.
pub async fn enumerate(
    source: &dyn DeviceSource,
    factory: &HandleFactory,
    options: &BTreeMap<String, Value>,
) -> Result<PassOutcome, PassError> {
    let attached = source.attached().await.map_err(PassError::Source)?;
    if attached.is_empty() {
        debug!("No devices attached");
    }

    let mut report = PassReport {
        fallback: true,
        ..Default::default()
    };
    let mut handles: Vec<DeviceHandle> = Vec::new();

    for device in attached.iter().filter(|d| d.trusted) {
        if handles.iter().any(|h| h.serial == device.serial) {
            continue;
        }

        let result = inspect_trusted(source, &device.serial)
            .await
            .and_then(|local| {
                let reconciled = ReconciledDevice::from_local(factory.platform(), &local, options);
                factory
                    .build(&reconciled)
                    .map_err(|e| DeviceFailure::from_handle(&device.serial, e))
            });

        match result {
            Ok(handle) => handles.push(handle),
            Err(failure) => report.record_failure(&failure),
        }
    }

    info!(
        attached = handles.len(),
        vanished = report.vanished,
        failed = report.failed,
        "Enumerated devices without Hive Mind"
    );

    Ok(PassOutcome { handles, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceStatus, Platform};
    use crate::testing::{local_device, FakeSource};

    #[tokio::test]
    async fn test_enumerates_trusted_devices_with_serial_ids() {
        let source = FakeSource::new(vec![
            local_device("A", true, "15.0"),
            local_device("B", false, "15.0"),
            local_device("C", true, "16.1"),
        ]);

        let outcome = enumerate(&source, &HandleFactory::new(Platform::Ios), &BTreeMap::new())
            .await
            .unwrap();

        assert!(outcome.report.fallback);
        let ids: Vec<&str> = outcome.handles.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        for handle in &outcome.handles {
            assert_eq!(handle.id.as_str(), handle.serial);
            assert_eq!(handle.status, DeviceStatus::Idle);
            assert_eq!(handle.brand, "Apple");
        }
        assert_eq!(outcome.handles[1].os_version, "16.1");
    }

    #[tokio::test]
    async fn test_vanished_device_is_isolated() {
        let source = FakeSource::new(vec![
            local_device("A", true, "15.0"),
            local_device("B", true, "15.0"),
        ])
        .with_vanished("A");

        let outcome = enumerate(&source, &HandleFactory::new(Platform::Ios), &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(outcome.handles.len(), 1);
        assert_eq!(outcome.handles[0].serial, "B");
        assert_eq!(outcome.report.vanished, 1);
    }

    #[tokio::test]
    async fn test_enumeration_failure_fails_pass() {
        let source = FakeSource::new(vec![]).failing_enumeration();

        let err = enumerate(&source, &HandleFactory::new(Platform::Ios), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PassError::Source(_)));
    }

    #[tokio::test]
    async fn test_revoked_trust_is_left_out() {
        let source = FakeSource::new(vec![
            local_device("A", true, "15.0"),
            local_device("B", true, "15.0"),
        ])
        .with_revoked_trust("A");

        let outcome = enumerate(&source, &HandleFactory::new(Platform::Ios), &BTreeMap::new())
            .await
            .unwrap();

        let serials: Vec<&str> = outcome.handles.iter().map(|h| h.serial.as_str()).collect();
        assert_eq!(serials, vec!["B"]);
        assert_eq!(outcome.report.failed, 1);
    }
}
