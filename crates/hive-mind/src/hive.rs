//! Identity of the host running the controller

use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use tracing::debug;

/// Hostname and hardware addresses reported when registering the hive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiveIdentity {
    pub hostname: String,
    pub macs: Vec<String>,
}

impl HiveIdentity {
    /// Detect the identity of this host
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|e| {
                debug!(error = %e, "Failed to read hostname");
                "localhost".to_string()
            });

        let macs = NetworkInterface::show()
            .map(|interfaces| {
                interfaces
                    .into_iter()
                    .filter(|iface| !is_virtual_interface(&iface.name))
                    .filter_map(|iface| iface.mac_addr)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            hostname,
            macs: normalize_macs(macs),
        }
    }
}

fn is_virtual_interface(name: &str) -> bool {
    name.starts_with("lo")
        || name.starts_with("docker")
        || name.starts_with("br-")
        || name.starts_with("veth")
}

/// Lowercase, drop all-zero addresses and duplicates (one per address family)
fn normalize_macs(macs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for mac in macs {
        let mac = mac.to_ascii_lowercase();
        if mac.is_empty() || mac.chars().all(|c| c == '0' || c == ':') {
            continue;
        }
        if !result.contains(&mac) {
            result.push(mac);
        }
    }
    result
}
