//! Local device source interface

use async_trait::async_trait;
use thiserror::Error;

use crate::device::{AttachedDevice, LocalDevice};

#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device was attached at enumeration time but is gone now
    #[error("Device not found: {0}")]
    NotFound(String),
    #[error("Device command failed: {0}")]
    Command(String),
    #[error("Unexpected device output: {0}")]
    InvalidOutput(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Devices physically attached to this host
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// Enumerate attached devices and their trust status
    async fn attached(&self) -> Result<Vec<AttachedDevice>, DeviceError>;

    /// Read the live attributes of one attached device
    async fn inspect(&self, serial: &str) -> Result<LocalDevice, DeviceError>;

    /// Attached devices that have not completed pairing
    async fn untrusted(&self) -> Result<Vec<AttachedDevice>, DeviceError> {
        Ok(self
            .attached()
            .await?
            .into_iter()
            .filter(|d| !d.trusted)
            .collect())
    }
}
