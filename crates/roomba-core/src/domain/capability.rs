//! Capability descriptor and the tier classifier.
//!
//! Robots advertise a `cap` object mapping feature names to integer support
//! levels.  A feature counts only when its level compares as at least 1:
//! integers and decimals `>= 1`, and `true`.  A missing key, a lower level,
//! or a string or object value all mean "not supported".  Lookups never fail.

use serde_json::{Map, Value};

use super::variant::DeviceVariant;

/// Capability key for dock communication (self-emptying base).
pub const CAP_DOCK_COMM: &str = "dockComm";
/// Capability key for carpet boost / fan speed control.
pub const CAP_CARPET_BOOST: &str = "carpetBoost";
/// Capability key for position (pose) reporting.
pub const CAP_POSE: &str = "pose";
/// Capability key for full-bin detection.
pub const CAP_BIN_FULL_DETECT: &str = "binFullDetect";

/// Capability name → support level, as reported in `state.reported.cap`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitySet {
    entries: Map<String, Value>,
}

impl CapabilitySet {
    pub fn new(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    /// Builds a set from any JSON value; anything but an object yields an
    /// empty set.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map.clone()),
            _ => Self::default(),
        }
    }

    /// Returns `true` only if `name` maps to a numeric level `>= 1` or to
    /// `true`.
    pub fn has(&self, name: &str) -> bool {
        match self.entries.get(name) {
            Some(Value::Number(n)) => n.as_f64().is_some_and(|level| level >= 1.0),
            Some(Value::Bool(flag)) => *flag,
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Selects the most specific variant the capability set supports.
///
/// Priority, most to least specific: dock communication, carpet boost,
/// position reporting, full-bin detection, then the basic tier.
pub fn classify(caps: &CapabilitySet) -> DeviceVariant {
    if caps.has(CAP_DOCK_COMM) {
        DeviceVariant::DockComm
    } else if caps.has(CAP_CARPET_BOOST) {
        DeviceVariant::CarpetBoost
    } else if caps.has(CAP_POSE) {
        DeviceVariant::Position
    } else if caps.has(CAP_BIN_FULL_DETECT) {
        DeviceVariant::BinDetect
    } else {
        DeviceVariant::Basic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caps(value: Value) -> CapabilitySet {
        CapabilitySet::from_value(&value)
    }

    #[test]
    fn test_has_requires_level_at_least_one() {
        let set = caps(json!({"pose": 1, "ota": 2, "eco": 0, "maps": -1}));
        assert!(set.has("pose"));
        assert!(set.has("ota"));
        assert!(!set.has("eco"));
        assert!(!set.has("maps"));
    }

    #[test]
    fn test_has_treats_missing_and_wrong_type_as_absent() {
        let set = caps(json!({"pose": {"x": 10}, "carpetBoost": "1", "edge": false, "pp": 0.5}));
        assert!(!set.has("pose"));
        assert!(!set.has("carpetBoost"));
        assert!(!set.has("edge"));
        assert!(!set.has("pp"));
        assert!(!set.has("dockComm"));
    }

    #[test]
    fn test_has_accepts_decimal_and_boolean_levels() {
        let set = caps(json!({"pose": 1.0, "ota": 2.5, "binFullDetect": true}));
        assert!(set.has("pose"));
        assert!(set.has("ota"));
        assert!(set.has("binFullDetect"));
        assert_eq!(classify(&set), DeviceVariant::Position);
    }

    #[test]
    fn test_from_value_non_object_is_empty() {
        assert!(caps(json!(null)).is_empty());
        assert!(caps(json!([1, 2])).is_empty());
        assert_eq!(caps(json!({"a": 1})).len(), 1);
    }

    #[test]
    fn test_classify_empty_set_is_basic() {
        assert_eq!(classify(&CapabilitySet::default()), DeviceVariant::Basic);
    }

    #[test]
    fn test_classify_single_capabilities() {
        assert_eq!(classify(&caps(json!({"binFullDetect": 1}))), DeviceVariant::BinDetect);
        assert_eq!(classify(&caps(json!({"pose": 1}))), DeviceVariant::Position);
        assert_eq!(classify(&caps(json!({"carpetBoost": 1}))), DeviceVariant::CarpetBoost);
        assert_eq!(classify(&caps(json!({"dockComm": 1}))), DeviceVariant::DockComm);
    }

    #[test]
    fn test_classify_priority_holds_for_every_flag_combination() {
        let names = [CAP_DOCK_COMM, CAP_CARPET_BOOST, CAP_POSE, CAP_BIN_FULL_DETECT];
        for mask in 0u8..16 {
            let mut map = Map::new();
            for (bit, name) in names.iter().enumerate() {
                let level = if mask & (1 << bit) != 0 { 1 } else { 0 };
                map.insert((*name).to_string(), json!(level));
            }
            let expected = if mask & 0b0001 != 0 {
                DeviceVariant::DockComm
            } else if mask & 0b0010 != 0 {
                DeviceVariant::CarpetBoost
            } else if mask & 0b0100 != 0 {
                DeviceVariant::Position
            } else if mask & 0b1000 != 0 {
                DeviceVariant::BinDetect
            } else {
                DeviceVariant::Basic
            };
            let set = CapabilitySet::new(map);
            assert_eq!(classify(&set), expected, "mask {mask:04b}");
            assert_eq!(classify(&set), classify(&set.clone()));
        }
    }

    #[test]
    fn test_classify_carpet_boost_wins_over_pose_payload() {
        let set = caps(json!({
            "dockComm": 0,
            "carpetBoost": 1,
            "pose": {"x": 10, "y": -5},
            "binFullDetect": 1
        }));
        assert_eq!(classify(&set), DeviceVariant::CarpetBoost);
    }
}
