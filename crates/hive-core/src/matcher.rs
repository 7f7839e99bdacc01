//! Pairing of registry records with attached devices

use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::device::{AttachedDevice, Platform, RemoteRecord};
use crate::snapshot::DetectionError;

/// A registry record whose device is attached and trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub local: AttachedDevice,
    pub remote: RemoteRecord,
}

/// Disjoint outcome of matching one snapshot against one enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: Vec<MatchedPair>,
    /// Records of this platform with no attached trusted device
    pub unmatched_remote: Vec<RemoteRecord>,
    /// Trusted devices not claimed by any record
    pub unmatched_local: Vec<AttachedDevice>,
}

/// Select the records of `platform` from a raw snapshot listing
pub fn platform_records(
    platform: Platform,
    records: &[Value],
) -> Result<Vec<RemoteRecord>, DetectionError> {
    let mut selected = Vec::new();

    for (index, raw) in records.iter().enumerate() {
        let os_name = raw
            .get("operating_system_name")
            .and_then(Value::as_str)
            .ok_or_else(|| DetectionError::MalformedRecord {
                index,
                reason: "missing operating_system_name".to_string(),
            })?;

        if !platform.matches_os_name(os_name) {
            continue;
        }

        let record: RemoteRecord = serde_json::from_value(raw.clone()).map_err(|e| {
            DetectionError::MalformedRecord {
                index,
                reason: e.to_string(),
            }
        })?;
        selected.push(record);
    }

    Ok(selected)
}

/// Match the snapshot records against the attached devices
///
/// Untrusted devices never match and are never reported as unmatched.
/// A serial is claimed by at most one record; later records with the same
/// serial are reported as unmatched.
pub fn match_devices(
    platform: Platform,
    records: &[Value],
    attached: &[AttachedDevice],
) -> Result<MatchResult, DetectionError> {
    let records = platform_records(platform, records)?;
    let mut result = MatchResult::default();
    let mut claimed: HashSet<&str> = HashSet::new();

    for remote in records {
        let local = attached
            .iter()
            .find(|d| d.trusted && d.serial == remote.serial);

        match local {
            Some(local) if claimed.insert(local.serial.as_str()) => {
                debug!(serial = %local.serial, id = %remote.id, "Matched registered device");
                result.matched.push(MatchedPair {
                    local: local.clone(),
                    remote,
                });
            }
            Some(_) => {
                debug!(serial = %remote.serial, id = %remote.id, "Duplicate registry record for serial");
                result.unmatched_remote.push(remote);
            }
            None => {
                debug!(serial = %remote.serial, id = %remote.id, "Registered device is not attached");
                result.unmatched_remote.push(remote);
            }
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    result.unmatched_local = attached
        .iter()
        .filter(|d| d.trusted && !claimed.contains(d.serial.as_str()))
        .filter(|d| seen.insert(d.serial.as_str()))
        .cloned()
        .collect();

    Ok(result)
}
