//! Hive Core - Device reconciliation between attached hardware and Hive Mind
//!
//! This crate provides the foundational pieces of the Hive controller:
//! - Device types for attached hardware and fleet registry records
//! - Snapshot interpretation for the registry's fleet listing
//! - Device matcher pairing registry records with attached devices
//! - Reconciliation engine applying update/poll/register actions
//! - Fallback enumeration when the registry is unavailable
//! - Handle factory producing the device handles given to workers

pub mod device;
pub mod fallback;
pub mod handle;
pub mod matcher;
pub mod reconcile;
pub mod registry;
pub mod snapshot;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use device::{
    AttachedDevice, DeviceStatus, HardwareIds, LocalDevice, Platform, ReconciledDevice,
    RecordId, RemoteRecord,
};
pub use handle::{DeviceHandle, HandleError, HandleFactory};
pub use matcher::{match_devices, MatchResult, MatchedPair};
pub use reconcile::{DeviceFailure, FailureKind, PassError, PassOutcome, PassReport, Reconciler};
pub use registry::{RecordUpdate, Registration, RegistryClient, RegistryError};
pub use snapshot::{DetectionError, Snapshot};
pub use source::{DeviceError, DeviceSource};
