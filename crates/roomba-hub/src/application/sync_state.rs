//! State synchronizer: session snapshot → typed property updates.
//!
//! A snapshot is the nested document `{"state": {"reported": {...}}}` kept
//! current by the session.  Every poll reads it one *field group* at a time.
//! A group that fails to read (missing key, wrong type) is logged and
//! skipped; the other groups still publish.
//!
//! Which groups run is decided by the device variant: a group runs only if
//! the variant exposes the property the group produces.

use std::fmt;

use roomba_core::domain::mission::{error_description, is_running, phase_code};
use roomba_core::domain::settings::edge_clean_from_open_only;
use roomba_core::{
    rssi_to_quality, BinFullBehavior, CleaningPasses, DeviceVariant, FanSpeed, PropertyId,
    PropertyUpdate, PropertyValue, SignalQualityState,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::manage_devices::ManagedDevice;
use crate::infrastructure::hub::HubPort;

/// Error reading one field out of a snapshot.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FieldError {
    #[error("{0} is not reported")]
    Missing(String),

    #[error("{path} is not {expected}")]
    WrongType {
        path: String,
        expected: &'static str,
    },
}

/// An independently-read slice of the reported state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    Mission,
    Connectivity,
    Battery,
    BinPresent,
    BinFull,
    BinPause,
    Wifi,
    Runtime,
    Error,
    PositionX,
    PositionY,
    Heading,
    Passes,
    EdgeClean,
    FanSpeed,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 15] = [
        FieldGroup::Mission,
        FieldGroup::Connectivity,
        FieldGroup::Battery,
        FieldGroup::BinPresent,
        FieldGroup::BinFull,
        FieldGroup::BinPause,
        FieldGroup::Wifi,
        FieldGroup::Runtime,
        FieldGroup::Error,
        FieldGroup::PositionX,
        FieldGroup::PositionY,
        FieldGroup::Heading,
        FieldGroup::Passes,
        FieldGroup::EdgeClean,
        FieldGroup::FanSpeed,
    ];

    /// The property whose presence in a variant enables this group.
    pub fn gate(self) -> PropertyId {
        match self {
            FieldGroup::Mission => PropertyId::MissionState,
            FieldGroup::Connectivity => PropertyId::Connected,
            FieldGroup::Battery => PropertyId::Battery,
            FieldGroup::BinPresent => PropertyId::BinPresent,
            FieldGroup::BinFull => PropertyId::BinFull,
            FieldGroup::BinPause => PropertyId::BinPause,
            FieldGroup::Wifi => PropertyId::WifiQuality,
            FieldGroup::Runtime => PropertyId::RuntimeHours,
            FieldGroup::Error => PropertyId::ErrorCode,
            FieldGroup::PositionX => PropertyId::PositionX,
            FieldGroup::PositionY => PropertyId::PositionY,
            FieldGroup::Heading => PropertyId::Heading,
            FieldGroup::Passes => PropertyId::Passes,
            FieldGroup::EdgeClean => PropertyId::EdgeClean,
            FieldGroup::FanSpeed => PropertyId::FanSpeed,
        }
    }

    /// Every property this group can emit.
    pub fn produces(self) -> &'static [PropertyId] {
        match self {
            FieldGroup::Mission => &[PropertyId::MissionState, PropertyId::Running],
            FieldGroup::Error => &[PropertyId::ErrorActive, PropertyId::ErrorCode],
            FieldGroup::Connectivity => &[PropertyId::Connected],
            FieldGroup::Battery => &[PropertyId::Battery],
            FieldGroup::BinPresent => &[PropertyId::BinPresent],
            FieldGroup::BinFull => &[PropertyId::BinFull],
            FieldGroup::BinPause => &[PropertyId::BinPause],
            FieldGroup::Wifi => &[PropertyId::WifiQuality],
            FieldGroup::Runtime => &[PropertyId::RuntimeHours],
            FieldGroup::PositionX => &[PropertyId::PositionX],
            FieldGroup::PositionY => &[PropertyId::PositionY],
            FieldGroup::Heading => &[PropertyId::Heading],
            FieldGroup::Passes => &[PropertyId::Passes],
            FieldGroup::EdgeClean => &[PropertyId::EdgeClean],
            FieldGroup::FanSpeed => &[PropertyId::FanSpeed],
        }
    }

    pub fn applies_to(self, variant: DeviceVariant) -> bool {
        variant.exposes(self.gate())
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldGroup::Mission => "mission state",
            FieldGroup::Connectivity => "connectivity",
            FieldGroup::Battery => "battery",
            FieldGroup::BinPresent => "bin presence",
            FieldGroup::BinFull => "bin full",
            FieldGroup::BinPause => "bin pause",
            FieldGroup::Wifi => "wifi signal",
            FieldGroup::Runtime => "runtime",
            FieldGroup::Error => "error status",
            FieldGroup::PositionX => "x position",
            FieldGroup::PositionY => "y position",
            FieldGroup::Heading => "heading",
            FieldGroup::Passes => "cleaning passes",
            FieldGroup::EdgeClean => "edge clean",
            FieldGroup::FanSpeed => "fan speed",
        }
    }
}

impl fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Field access ─────────────────────────────────────────────────────────────

/// Looks up `path` (slash separated, relative to `state.reported`).
fn reported<'a>(snapshot: &'a Value, path: &str) -> Result<&'a Value, FieldError> {
    snapshot
        .pointer(&format!("/state/reported/{path}"))
        .ok_or_else(|| FieldError::Missing(path.to_string()))
}

fn read_bool(snapshot: &Value, path: &str) -> Result<bool, FieldError> {
    let value = reported(snapshot, path)?;
    value
        .as_bool()
        .or_else(|| value.as_i64().map(|n| n != 0))
        .ok_or_else(|| FieldError::WrongType {
            path: path.to_string(),
            expected: "a boolean",
        })
}

fn read_f64(snapshot: &Value, path: &str) -> Result<f64, FieldError> {
    reported(snapshot, path)?
        .as_f64()
        .ok_or_else(|| FieldError::WrongType {
            path: path.to_string(),
            expected: "a number",
        })
}

/// Reads a number, truncating any fractional part.
fn read_int(snapshot: &Value, path: &str) -> Result<i64, FieldError> {
    let value = reported(snapshot, path)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| FieldError::WrongType {
            path: path.to_string(),
            expected: "a number",
        })
}

fn read_str<'a>(snapshot: &'a Value, path: &str) -> Result<&'a str, FieldError> {
    reported(snapshot, path)?
        .as_str()
        .ok_or_else(|| FieldError::WrongType {
            path: path.to_string(),
            expected: "a string",
        })
}

// ── Synchronizer ─────────────────────────────────────────────────────────────

/// Per-device memory carried between polls.
#[derive(Debug, Clone, Default)]
pub struct StateSynchronizer {
    wifi: SignalQualityState,
    last_connected: Option<bool>,
    last_error: Option<i64>,
}

impl StateSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wifi(&self) -> &SignalQualityState {
        &self.wifi
    }

    /// Reads every group that applies to `variant` and returns the updates
    /// to publish.
    pub fn sync(
        &mut self,
        name: &str,
        variant: DeviceVariant,
        snapshot: &Value,
        connected: bool,
    ) -> Vec<PropertyUpdate> {
        let mut updates = Vec::new();
        for group in FieldGroup::ALL {
            if !group.applies_to(variant) {
                continue;
            }
            match self.read_group(group, name, snapshot, connected) {
                Ok(mut group_updates) => updates.append(&mut group_updates),
                Err(e) => warn!("failed to update {group} on {name}: {e}"),
            }
        }
        updates
    }

    fn read_group(
        &mut self,
        group: FieldGroup,
        name: &str,
        snapshot: &Value,
        connected: bool,
    ) -> Result<Vec<PropertyUpdate>, FieldError> {
        let updates = match group {
            FieldGroup::Mission => {
                let phase = read_str(snapshot, "cleanMissionStatus/phase")?;
                match phase_code(phase) {
                    Some(code) => vec![
                        PropertyUpdate::int(PropertyId::MissionState, code),
                        PropertyUpdate::new(
                            PropertyId::Running,
                            PropertyValue::on_off(is_running(code)),
                        ),
                    ],
                    None => {
                        debug!("{name} reports unknown mission phase {phase:?}");
                        Vec::new()
                    }
                }
            }
            FieldGroup::Connectivity => {
                self.track_connectivity(name, connected);
                vec![PropertyUpdate::new(
                    PropertyId::Connected,
                    PropertyValue::from_bool(connected),
                )]
            }
            FieldGroup::Battery => {
                vec![PropertyUpdate::int(
                    PropertyId::Battery,
                    read_int(snapshot, "batPct")?,
                )]
            }
            FieldGroup::BinPresent => vec![PropertyUpdate::new(
                PropertyId::BinPresent,
                PropertyValue::from_bool(read_bool(snapshot, "bin/present")?),
            )],
            FieldGroup::BinFull => vec![PropertyUpdate::new(
                PropertyId::BinFull,
                PropertyValue::from_bool(read_bool(snapshot, "bin/full")?),
            )],
            FieldGroup::BinPause => {
                let behavior = BinFullBehavior::from_flag(read_bool(snapshot, "binPause")?);
                vec![PropertyUpdate::int(PropertyId::BinPause, behavior.index())]
            }
            FieldGroup::Wifi => {
                let quality = rssi_to_quality(read_f64(snapshot, "signal/rssi")?);
                match self.wifi.observe(quality) {
                    Some(q) => vec![PropertyUpdate::int(PropertyId::WifiQuality, i64::from(q))],
                    None => Vec::new(),
                }
            }
            FieldGroup::Runtime => {
                let hours = read_f64(snapshot, "bbrun/hr")?;
                let minutes = read_f64(snapshot, "bbrun/min")?;
                let runtime = ((hours + minutes / 60.0) * 10.0).round() / 10.0;
                vec![PropertyUpdate::new(
                    PropertyId::RuntimeHours,
                    PropertyValue::Decimal(runtime),
                )]
            }
            FieldGroup::Error => {
                let status = reported(snapshot, "cleanMissionStatus")?;
                let code = match status.get("error") {
                    None => 0,
                    Some(_) => read_int(snapshot, "cleanMissionStatus/error")?,
                };
                self.track_error(name, code);
                vec![
                    PropertyUpdate::new(PropertyId::ErrorActive, PropertyValue::from_bool(code != 0)),
                    PropertyUpdate::int(PropertyId::ErrorCode, code),
                ]
            }
            FieldGroup::PositionX => {
                vec![PropertyUpdate::int(
                    PropertyId::PositionX,
                    read_int(snapshot, "pose/point/x")?,
                )]
            }
            FieldGroup::PositionY => {
                vec![PropertyUpdate::int(
                    PropertyId::PositionY,
                    read_int(snapshot, "pose/point/y")?,
                )]
            }
            FieldGroup::Heading => {
                vec![PropertyUpdate::int(
                    PropertyId::Heading,
                    read_int(snapshot, "pose/theta")?,
                )]
            }
            FieldGroup::Passes => {
                let no_auto_passes = read_bool(snapshot, "noAutoPasses")?;
                // twoPass only matters once automatic passes are off.
                let two_pass = no_auto_passes && read_bool(snapshot, "twoPass")?;
                let passes = CleaningPasses::from_flags(no_auto_passes, two_pass);
                vec![PropertyUpdate::int(PropertyId::Passes, passes.index())]
            }
            FieldGroup::EdgeClean => {
                let edge_clean = edge_clean_from_open_only(read_bool(snapshot, "openOnly")?);
                vec![PropertyUpdate::new(
                    PropertyId::EdgeClean,
                    PropertyValue::on_off(edge_clean),
                )]
            }
            FieldGroup::FanSpeed => {
                let carpet_boost = read_bool(snapshot, "carpetBoost")?;
                let vac_high = read_bool(snapshot, "vacHigh")?;
                let speed = FanSpeed::from_flags(carpet_boost, vac_high);
                vec![PropertyUpdate::int(PropertyId::FanSpeed, speed.index())]
            }
        };
        Ok(updates)
    }

    fn track_connectivity(&mut self, name: &str, connected: bool) {
        match (self.last_connected, connected) {
            (Some(true), false) => error!("{name} disconnected"),
            (Some(false) | None, true) => info!("{name} connected"),
            _ => {}
        }
        self.last_connected = Some(connected);
    }

    fn track_error(&mut self, name: &str, code: i64) {
        if self.last_error == Some(code) {
            return;
        }
        if code != 0 {
            let description = error_description(code).unwrap_or("unknown error");
            warn!("{name} reports error {code}: {description}");
        } else if self.last_error.is_some() {
            info!("{name} error cleared");
        }
        self.last_error = Some(code);
    }
}

/// Polls `device`'s session once and publishes the result to the hub.
///
/// With `report_all` every property is published with its current value,
/// not just the ones this poll produced.  Returns the number of property
/// values sent.
pub fn refresh(device: &mut ManagedDevice, hub: &dyn HubPort, report_all: bool) -> usize {
    let Some(session) = device.session() else {
        debug!("{} has no session to poll", device.name());
        return 0;
    };
    let updates = device.apply_snapshot(&session.snapshot(), session.is_connected());

    let outgoing: Vec<PropertyUpdate> = if report_all {
        device
            .properties()
            .entries()
            .iter()
            .map(|entry| PropertyUpdate::new(entry.id, entry.value))
            .collect()
    } else {
        updates
    };
    if outgoing.is_empty() {
        return 0;
    }

    match hub.publish(device.address(), &outgoing) {
        Ok(()) => outgoing.len(),
        Err(e) => {
            warn!("failed to publish state of {}: {e}", device.name());
            0
        }
    }
}
