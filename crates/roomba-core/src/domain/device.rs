//! Identity and network facts learned about a robot during discovery.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable identifier of a robot (the `BLID`), derived from its hostname.
pub type DeviceId = String;

/// Number of trailing device-id characters used in the hub node address.
const NODE_ADDRESS_ID_CHARS: usize = 10;

/// Everything the beacon scanner learned about one robot, plus the credential
/// once bootstrap has succeeded.
///
/// `ip` is the unique key within a single scan; `device_id` is the key that
/// survives DHCP changes and process restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub ip: String,
    pub hostname: String,
    pub robot_name: String,
    pub mac: String,
    pub firmware: String,
    pub sku: String,
    pub device_id: DeviceId,
    /// Raw capability descriptor advertised in the discovery reply.
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl DeviceRecord {
    /// Returns `true` once a non-empty credential has been recorded.
    pub fn has_credential(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Hub node address: `rm` followed by the last ten characters of the
    /// device id, lower-cased.
    pub fn node_address(&self) -> String {
        let chars: Vec<char> = self.device_id.chars().collect();
        let start = chars.len().saturating_sub(NODE_ADDRESS_ID_CHARS);
        let tail: String = chars[start..].iter().collect();
        format!("rm{}", tail.to_lowercase())
    }

    /// Copies the credential from a previously known record of the same robot
    /// when this record has none.
    pub fn inherit_credential(&mut self, previous: &DeviceRecord) {
        if !self.has_credential() && previous.has_credential() {
            self.credential = previous.credential.clone();
        }
    }
}

/// Extracts the device id from an advertised hostname: everything after the
/// first `-` (`Roomba-3145C60822630830` → `3145C60822630830`).
///
/// Returns `None` when the hostname has no `-` or nothing follows it.
pub fn device_id_from_hostname(hostname: &str) -> Option<DeviceId> {
    let (_, rest) = hostname.split_once('-')?;
    let id = rest.split('-').next().unwrap_or(rest);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
