//! Beacon datagram codec.
//!
//! The hub broadcasts the ASCII probe `irobotmcs` to UDP port 5678.  Robots
//! answer with a JSON object:
//!
//! ```text
//! {"ver":"3","hostname":"Roomba-3145C60822630830","robotname":"Downstairs",
//!  "ip":"192.168.1.40","mac":"70:66:55:aa:bb:cc","sw":"v2.4.16-126",
//!  "sku":"R980020","nc":0,"proto":"mqtt","cap":{"pose":1,"carpetBoost":1}}
//! ```
//!
//! Because the probe is broadcast on the same port the hub listens on, the
//! hub also receives its own probe; those echoes are classified separately.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::ProtocolError;
use crate::domain::device::{device_id_from_hostname, DeviceRecord};

/// UDP port robots listen on for beacon probes.
pub const DISCOVERY_PORT: u16 = 5678;

/// ASCII probe payload.
pub const PROBE: &str = "irobotmcs";

/// Hostname substrings that identify a robot reply.
pub const VENDOR_MARKERS: [&str; 2] = ["Roomba", "iRobot"];

#[derive(Debug, Deserialize)]
struct BeaconReply {
    hostname: String,
    robotname: String,
    ip: String,
    mac: String,
    sw: String,
    sku: String,
    cap: Map<String, Value>,
}

/// Classification of one received datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    /// Our own probe, looped back by the broadcast.
    Echo,
    /// Valid JSON from something that is not a robot.
    Foreign { hostname: String },
    /// A robot reply.
    Robot(DeviceRecord),
}

/// Decodes a datagram received on the discovery socket.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the datagram is not UTF-8, not JSON, or a
/// robot reply is missing one of its fields.
pub fn decode_datagram(bytes: &[u8]) -> Result<Datagram, ProtocolError> {
    let text =
        std::str::from_utf8(bytes).map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))?;
    if text == PROBE {
        return Ok(Datagram::Echo);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    let hostname = value
        .get("hostname")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::MalformedPayload("missing hostname".to_string()))?;

    if !VENDOR_MARKERS.iter().any(|m| hostname.contains(m)) {
        return Ok(Datagram::Foreign {
            hostname: hostname.to_string(),
        });
    }

    let reply: BeaconReply = serde_json::from_value(value)
        .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;
    let device_id = device_id_from_hostname(&reply.hostname).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!("no device id in hostname {}", reply.hostname))
    })?;

    Ok(Datagram::Robot(DeviceRecord {
        ip: reply.ip,
        hostname: reply.hostname,
        robot_name: reply.robotname,
        mac: reply.mac,
        firmware: reply.sw,
        sku: reply.sku,
        device_id,
        capabilities: reply.cap,
        credential: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{"ver":"3","hostname":"Roomba-3145C60822630830","robotname":"Downstairs","ip":"192.168.1.40","mac":"70:66:55:aa:bb:cc","sw":"v2.4.16-126","sku":"R980020","nc":0,"proto":"mqtt","cap":{"pose":1,"ota":2,"multiPass":2,"carpetBoost":1}}"#;

    #[test]
    fn test_decode_robot_reply() {
        let Datagram::Robot(record) = decode_datagram(REPLY.as_bytes()).unwrap() else {
            panic!("expected a robot reply");
        };
        assert_eq!(record.device_id, "3145C60822630830");
        assert_eq!(record.robot_name, "Downstairs");
        assert_eq!(record.ip, "192.168.1.40");
        assert_eq!(record.firmware, "v2.4.16-126");
        assert_eq!(record.sku, "R980020");
        assert_eq!(record.capabilities.get("carpetBoost"), Some(&Value::from(1)));
        assert_eq!(record.credential, None);
    }

    #[test]
    fn test_decode_irobot_hostname_is_accepted() {
        let reply = REPLY.replace("Roomba-3145C60822630830", "iRobot-A1B2C3");
        let decoded = decode_datagram(reply.as_bytes()).unwrap();
        assert!(matches!(decoded, Datagram::Robot(r) if r.device_id == "A1B2C3"));
    }

    #[test]
    fn test_decode_own_probe_is_echo() {
        assert_eq!(decode_datagram(PROBE.as_bytes()), Ok(Datagram::Echo));
    }

    #[test]
    fn test_decode_non_robot_hostname_is_foreign() {
        let reply = r#"{"hostname":"printer-01","ip":"192.168.1.9"}"#;
        assert_eq!(
            decode_datagram(reply.as_bytes()),
            Ok(Datagram::Foreign {
                hostname: "printer-01".to_string()
            })
        );
    }

    #[test]
    fn test_decode_malformed_json_is_error() {
        let result = decode_datagram(b"{not json");
        assert!(matches!(result, Err(ProtocolError::InvalidJson(_))));
    }

    #[test]
    fn test_decode_robot_reply_missing_field_is_error() {
        let reply = r#"{"hostname":"Roomba-ABC","robotname":"x","ip":"1.2.3.4"}"#;
        let result = decode_datagram(reply.as_bytes());
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_invalid_utf8_is_error() {
        let result = decode_datagram(&[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8(_))));
    }
}
