//! In-memory registry and device source used by the engine tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::device::{AttachedDevice, HardwareIds, LocalDevice, RecordId};
use crate::registry::{RecordUpdate, Registration, RegistryClient, RegistryError};
use crate::snapshot::{DetectionError, Snapshot};
use crate::source::{DeviceError, DeviceSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchSnapshot,
    Register(String),
    Connect(RecordId),
    Poll(Vec<RecordId>),
    Update(RecordId, String),
}

pub fn record(id: u64, serial: &str, os: &str, version: &str) -> Value {
    json!({
        "id": id,
        "serial": serial,
        "name": format!("device-{}", serial),
        "operating_system_name": os,
        "operating_system_version": version,
    })
}

pub fn local_device(serial: &str, trusted: bool, version: &str) -> LocalDevice {
    LocalDevice {
        serial: serial.to_string(),
        trusted,
        name: None,
        brand: None,
        model: "iPhone12,1".to_string(),
        os_version: version.to_string(),
        device_type: "Phone".to_string(),
        device_class: "iPhone".to_string(),
        hardware_ids: HardwareIds::default(),
    }
}

pub struct FakeRegistry {
    snapshot: Snapshot,
    next_id: Mutex<u64>,
    rejected: HashSet<String>,
    fail_poll: bool,
    failing_updates: HashSet<RecordId>,
    failing_connects: HashSet<RecordId>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRegistry {
    pub fn available(records: Vec<Value>) -> Self {
        Self::with_snapshot(Snapshot::Available { records })
    }

    pub fn unavailable(reason: &str) -> Self {
        Self::with_snapshot(Snapshot::unavailable(reason))
    }

    fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            next_id: Mutex::new(100),
            rejected: HashSet::new(),
            fail_poll: false,
            failing_updates: HashSet::new(),
            failing_connects: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_next_id(self, id: u64) -> Self {
        *self.next_id.lock().unwrap() = id;
        self
    }

    pub fn rejecting_registration(mut self, serial: &str) -> Self {
        self.rejected.insert(serial.to_string());
        self
    }

    pub fn failing_poll(mut self) -> Self {
        self.fail_poll = true;
        self
    }

    pub fn failing_update(mut self, id: u64) -> Self {
        self.failing_updates.insert(RecordId::from(id));
        self
    }

    pub fn failing_connect(mut self, id: u64) -> Self {
        self.failing_connects.insert(RecordId::from(id));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn update_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Update(..)))
            .count()
    }

    pub fn poll_batches(&self) -> Vec<Vec<RecordId>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Poll(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn fetch_snapshot(&self) -> Result<Snapshot, DetectionError> {
        self.log(Call::FetchSnapshot);
        Ok(self.snapshot.clone())
    }

    async fn register(&self, registration: &Registration) -> Result<RecordId, RegistryError> {
        self.log(Call::Register(registration.serial.clone()));
        if self.rejected.contains(&registration.serial) {
            return Err(RegistryError::Rejected {
                status: 422,
                body: "serial rejected".to_string(),
            });
        }
        let mut next = self.next_id.lock().unwrap();
        let id = RecordId::from(*next);
        *next += 1;
        Ok(id)
    }

    async fn connect(&self, id: &RecordId) -> Result<(), RegistryError> {
        self.log(Call::Connect(id.clone()));
        if self.failing_connects.contains(id) {
            return Err(RegistryError::Unreachable("connection reset".to_string()));
        }
        Ok(())
    }

    async fn poll(&self, ids: &[RecordId]) -> Result<(), RegistryError> {
        self.log(Call::Poll(ids.to_vec()));
        if self.fail_poll {
            return Err(RegistryError::Unreachable("timed out".to_string()));
        }
        Ok(())
    }

    async fn update_record(&self, id: &RecordId, update: &RecordUpdate) -> Result<(), RegistryError> {
        self.log(Call::Update(id.clone(), update.os_version.clone()));
        if self.failing_updates.contains(id) {
            return Err(RegistryError::Rejected {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(())
    }
}

pub struct FakeSource {
    devices: Vec<LocalDevice>,
    vanished: HashSet<String>,
    revoked: HashSet<String>,
    fail_enumeration: bool,
    inspected: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new(devices: Vec<LocalDevice>) -> Self {
        Self {
            devices,
            vanished: HashSet::new(),
            revoked: HashSet::new(),
            fail_enumeration: false,
            inspected: Mutex::new(Vec::new()),
        }
    }

    /// Device stays enumerated but is gone when inspected
    pub fn with_vanished(mut self, serial: &str) -> Self {
        self.vanished.insert(serial.to_string());
        self
    }

    /// Device enumerates as trusted but reads back untrusted
    pub fn with_revoked_trust(mut self, serial: &str) -> Self {
        self.revoked.insert(serial.to_string());
        self
    }

    pub fn failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    pub fn inspected(&self) -> Vec<String> {
        self.inspected.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceSource for FakeSource {
    async fn attached(&self) -> Result<Vec<AttachedDevice>, DeviceError> {
        if self.fail_enumeration {
            return Err(DeviceError::Command("idevice_id not installed".to_string()));
        }
        Ok(self
            .devices
            .iter()
            .map(|d| AttachedDevice::new(d.serial.clone(), d.trusted))
            .collect())
    }

    async fn inspect(&self, serial: &str) -> Result<LocalDevice, DeviceError> {
        self.inspected.lock().unwrap().push(serial.to_string());
        if self.vanished.contains(serial) {
            return Err(DeviceError::NotFound(serial.to_string()));
        }
        if self.revoked.contains(serial) {
            return Ok(LocalDevice::untrusted(serial));
        }
        let devices: HashMap<&str, &LocalDevice> =
            self.devices.iter().map(|d| (d.serial.as_str(), d)).collect();
        devices
            .get(serial)
            .map(|d| (*d).clone())
            .ok_or_else(|| DeviceError::NotFound(serial.to_string()))
    }
}
