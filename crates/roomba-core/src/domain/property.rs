//! Typed properties exposed to the hub.
//!
//! Every property has a fixed hub driver code and unit-of-measure tag.  A
//! [`PropertySet`] holds the current value of each property a variant exposes
//! and is overwritten in place on every poll; entries are never removed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hub unit-of-measure tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Uom {
    Boolean,
    Hours,
    Degrees,
    Index,
    Percent,
    Raw,
    OnOff,
}

impl Uom {
    /// Numeric tag understood by the hub.
    pub fn code(self) -> u8 {
        match self {
            Uom::Boolean => 2,
            Uom::Degrees => 14,
            Uom::Hours => 20,
            Uom::Index => 25,
            Uom::Percent => 51,
            Uom::Raw => 56,
            Uom::OnOff => 78,
        }
    }
}

/// Identifier of one hub property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertyId {
    Running,
    MissionState,
    Connected,
    Battery,
    BinPresent,
    WifiQuality,
    RuntimeHours,
    ErrorActive,
    ErrorCode,
    BinFull,
    BinPause,
    PositionX,
    PositionY,
    Heading,
    Passes,
    EdgeClean,
    FanSpeed,
}

impl PropertyId {
    /// Hub driver code (`ST`, `GV1`, ...).
    pub fn driver(self) -> &'static str {
        match self {
            PropertyId::Running => "ST",
            PropertyId::MissionState => "GV1",
            PropertyId::Connected => "GV2",
            PropertyId::Battery => "BATLVL",
            PropertyId::BinPresent => "GV3",
            PropertyId::WifiQuality => "GV4",
            PropertyId::RuntimeHours => "GV5",
            PropertyId::ErrorActive => "GV6",
            PropertyId::ErrorCode => "ALARM",
            PropertyId::BinFull => "GV7",
            PropertyId::BinPause => "GV8",
            PropertyId::PositionX => "GV9",
            PropertyId::PositionY => "GV10",
            PropertyId::Heading => "ROTATE",
            PropertyId::Passes => "GV11",
            PropertyId::EdgeClean => "GV12",
            PropertyId::FanSpeed => "GV13",
        }
    }

    pub fn uom(self) -> Uom {
        match self {
            PropertyId::Running | PropertyId::EdgeClean => Uom::OnOff,
            PropertyId::MissionState
            | PropertyId::ErrorCode
            | PropertyId::BinPause
            | PropertyId::Passes
            | PropertyId::FanSpeed => Uom::Index,
            PropertyId::Connected
            | PropertyId::BinPresent
            | PropertyId::ErrorActive
            | PropertyId::BinFull => Uom::Boolean,
            PropertyId::Battery | PropertyId::WifiQuality => Uom::Percent,
            PropertyId::RuntimeHours => Uom::Hours,
            PropertyId::PositionX | PropertyId::PositionY => Uom::Raw,
            PropertyId::Heading => Uom::Degrees,
        }
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver())
    }
}

/// Value carried by a property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i64),
    Decimal(f64),
}

impl PropertyValue {
    pub fn from_bool(value: bool) -> Self {
        PropertyValue::Int(i64::from(value))
    }

    /// `0` or `100`, the hub's on/off encoding.
    pub fn on_off(value: bool) -> Self {
        PropertyValue::Int(if value { 100 } else { 0 })
    }

    pub fn as_f64(self) -> f64 {
        match self {
            PropertyValue::Int(v) => v as f64,
            PropertyValue::Decimal(v) => v,
        }
    }
}

impl Default for PropertyValue {
    fn default() -> Self {
        PropertyValue::Int(0)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Decimal(v) => write!(f, "{v:.1}"),
        }
    }
}

/// A single property write produced by the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyUpdate {
    pub id: PropertyId,
    pub value: PropertyValue,
}

impl PropertyUpdate {
    pub fn new(id: PropertyId, value: PropertyValue) -> Self {
        Self { id, value }
    }

    pub fn int(id: PropertyId, value: i64) -> Self {
        Self::new(id, PropertyValue::Int(value))
    }
}

/// One entry of a [`PropertySet`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyEntry {
    pub id: PropertyId,
    pub value: PropertyValue,
    pub uom: Uom,
}

/// Ordered property table for one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySet {
    entries: Vec<PropertyEntry>,
}

impl PropertySet {
    /// Creates a set holding `ids` in order, each initialised to zero.
    pub fn with_properties(ids: &[PropertyId]) -> Self {
        let entries = ids
            .iter()
            .map(|&id| PropertyEntry {
                id,
                value: PropertyValue::default(),
                uom: id.uom(),
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: PropertyId) -> Option<PropertyValue> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.value)
    }

    /// Overwrites the value of `update.id`.
    ///
    /// Returns `true` if the property is part of this set.  Updates for
    /// properties outside the set are ignored.
    pub fn apply(&mut self, update: PropertyUpdate) -> bool {
        match self.entries.iter_mut().find(|e| e.id == update.id) {
            Some(entry) => {
                entry.value = update.value;
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[PropertyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
