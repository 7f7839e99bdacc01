//! Periodic reconciliation and attach/detach tracking

use anyhow::Result;
use chrono::{DateTime, Utc};
use hive_core::{DeviceHandle, PassOutcome, Reconciler};
use std::collections::HashMap;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// A device handed to workers, with when it was first seen
#[derive(Debug, Clone, PartialEq)]
pub struct FleetEntry {
    pub handle: DeviceHandle,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Change in the attached fleet between two passes
#[derive(Debug, Clone, PartialEq)]
pub enum FleetChange {
    Attached(DeviceHandle),
    Detached(FleetEntry),
}

/// Devices currently handed to workers, keyed by serial
#[derive(Debug, Default)]
pub struct Fleet {
    entries: HashMap<String, FleetEntry>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Replace the fleet with the handles of a pass, returning what changed
    pub fn apply(&mut self, handles: &[DeviceHandle]) -> Vec<FleetChange> {
        let now = Utc::now();
        let mut changes = Vec::new();
        let mut next = HashMap::with_capacity(handles.len());

        for handle in handles {
            let entry = match self.entries.remove(&handle.serial) {
                Some(mut entry) => {
                    entry.handle = handle.clone();
                    entry.last_seen = now;
                    entry
                }
                None => {
                    changes.push(FleetChange::Attached(handle.clone()));
                    FleetEntry {
                        handle: handle.clone(),
                        first_seen: now,
                        last_seen: now,
                    }
                }
            };
            next.insert(handle.serial.clone(), entry);
        }

        for (_, entry) in self.entries.drain() {
            changes.push(FleetChange::Detached(entry));
        }

        self.entries = next;
        changes
    }
}

/// Runs reconciliation passes one after another
pub struct Controller {
    reconciler: Reconciler,
    fleet: Fleet,
}

impl Controller {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            fleet: Fleet::new(),
        }
    }

    /// Run a single pass and update the fleet
    pub async fn pass(&mut self) -> Result<PassOutcome> {
        let outcome = self.reconciler.run_pass().await?;

        for change in self.fleet.apply(&outcome.handles) {
            match change {
                FleetChange::Attached(handle) => info!(
                    serial = %handle.serial,
                    id = %handle.id,
                    name = %handle.display_name(),
                    os_version = %handle.os_version,
                    "Device attached"
                ),
                FleetChange::Detached(entry) => info!(
                    serial = %entry.handle.serial,
                    id = %entry.handle.id,
                    name = %entry.handle.display_name(),
                    first_seen = %entry.first_seen,
                    last_seen = %entry.last_seen,
                    "Device detached"
                ),
            }
        }

        Ok(outcome)
    }

    /// Run passes on an interval until Ctrl-C
    pub async fn run(&mut self, every: Duration) -> Result<()> {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = every.as_secs(), "Reconciliation loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.pass().await {
                        error!(error = %e, "Reconciliation pass failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!(devices = self.fleet.len(), "Shutting down");
                    return Ok(());
                }
            }
        }
    }
}
