//! Fleet snapshot returned by the registry
//!
//! A snapshot is either a listing of the records attached to this hive or an
//! explicit unavailability marker. The boundary between the two is a single
//! rule applied by [`Snapshot::from_response`]:
//!
//! - a body carrying an `error` key means the registry is unavailable and the
//!   controller degrades to local enumeration;
//! - any other body must carry a `connected_devices` array, otherwise the
//!   response cannot be interpreted and the pass fails.
//!
//! Transport failures never reach this function; registry clients map them
//! to [`Snapshot::Unavailable`] directly.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Malformed registry snapshot: {0}")]
    Malformed(String),
    #[error("Malformed registry record {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

/// Point-in-time listing of registry records
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// The registry cannot be used for this pass
    Unavailable { reason: String },
    /// Raw records of every device attached to this hive, any platform
    Available { records: Vec<Value> },
}

impl Snapshot {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Interpret a decoded registry response body
    pub fn from_response(body: Value) -> Result<Self, DetectionError> {
        let Value::Object(mut map) = body else {
            return Err(DetectionError::Malformed(
                "response is not a JSON object".to_string(),
            ));
        };

        if let Some(error) = map.get("error") {
            let reason = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(Self::Unavailable { reason });
        }

        match map.remove("connected_devices") {
            Some(Value::Array(records)) => Ok(Self::Available { records }),
            Some(other) => Err(DetectionError::Malformed(format!(
                "connected_devices is not a list: {}",
                other
            ))),
            None => Err(DetectionError::Malformed(
                "missing connected_devices".to_string(),
            )),
        }
    }
}
