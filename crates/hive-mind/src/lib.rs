//! Hive Mind - Fleet registry client for the Hive controller
//!
//! This crate talks to the Hive Mind HTTP API on behalf of a hive:
//! - Fetching the devices currently attached to the hive
//! - Registering, connecting, polling and updating device records
//! - Registering the hive itself when it has no id yet

pub mod client;
pub mod hive;
pub mod payload;

pub use client::{HiveMindClient, OfflineRegistry, DEFAULT_TIMEOUT_SECS};
pub use hive::HiveIdentity;
