//! Request and response bodies of the Hive Mind API

use hive_core::{RecordId, RecordUpdate, Registration};
use serde::{Deserialize, Serialize};

use crate::hive::HiveIdentity;

/// `POST /api/devices/register.json`
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a, T: Serialize> {
    pub device: &'a T,
}

/// Record update sent through the register endpoint with an existing id
#[derive(Debug, Serialize)]
pub struct UpdateDevice<'a> {
    pub id: &'a RecordId,
    #[serde(flatten)]
    pub update: &'a RecordUpdate,
}

/// Hive self-registration
#[derive(Debug, Serialize)]
pub struct HiveDevice<'a> {
    pub hostname: &'a str,
    pub macs: &'a [String],
    pub brand: &'static str,
    pub model: &'static str,
    pub device_type: &'static str,
}

impl<'a> HiveDevice<'a> {
    pub fn new(identity: &'a HiveIdentity) -> Self {
        Self {
            hostname: &identity.hostname,
            macs: &identity.macs,
            brand: "BBC",
            model: "Hive",
            device_type: "Hive",
        }
    }
}

/// `PUT /api/plugin/hive/connect.json`
#[derive(Debug, Serialize)]
pub struct ConnectRequest<'a> {
    pub connection: Connection<'a>,
}

#[derive(Debug, Serialize)]
pub struct Connection<'a> {
    pub hive_id: &'a RecordId,
    pub device_id: &'a RecordId,
}

/// `PUT /api/devices/poll.json`
#[derive(Debug, Serialize)]
pub struct PollRequest<'a> {
    pub poll: Poll<'a>,
}

#[derive(Debug, Serialize)]
pub struct Poll<'a> {
    pub id: &'a RecordId,
    pub devices: &'a [RecordId],
}

/// Minimal view of a record returned by the register endpoint
#[derive(Debug, Deserialize)]
pub struct RegisteredRecord {
    pub id: RecordId,
}

pub fn register_body(registration: &Registration) -> RegisterRequest<'_, Registration> {
    RegisterRequest {
        device: registration,
    }
}
