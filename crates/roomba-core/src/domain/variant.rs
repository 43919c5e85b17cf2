//! Device feature tiers and their property/command tables.
//!
//! Each tier exposes everything the previous tier does plus its own
//! additions, so "which fields apply" is a lookup keyed by the tier tag.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::property::PropertyId;

/// Ordered feature tier of a robot.  Later variants compare greater.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum DeviceVariant {
    Basic,
    BinDetect,
    Position,
    CarpetBoost,
    DockComm,
}

const BASIC_PROPERTIES: &[PropertyId] = &[
    PropertyId::Running,
    PropertyId::MissionState,
    PropertyId::Connected,
    PropertyId::Battery,
    PropertyId::BinPresent,
    PropertyId::WifiQuality,
    PropertyId::RuntimeHours,
    PropertyId::ErrorActive,
    PropertyId::ErrorCode,
];

const BIN_DETECT_PROPERTIES: &[PropertyId] = &[PropertyId::BinFull, PropertyId::BinPause];

const POSITION_PROPERTIES: &[PropertyId] = &[
    PropertyId::PositionX,
    PropertyId::PositionY,
    PropertyId::Heading,
    PropertyId::Passes,
    PropertyId::EdgeClean,
];

const CARPET_BOOST_PROPERTIES: &[PropertyId] = &[PropertyId::FanSpeed];

const BASIC_COMMANDS: &[CommandKind] = &[
    CommandKind::Start,
    CommandKind::Stop,
    CommandKind::Pause,
    CommandKind::Resume,
    CommandKind::Dock,
    CommandKind::Query,
];

impl DeviceVariant {
    pub const ALL: [DeviceVariant; 5] = [
        DeviceVariant::Basic,
        DeviceVariant::BinDetect,
        DeviceVariant::Position,
        DeviceVariant::CarpetBoost,
        DeviceVariant::DockComm,
    ];

    /// Hub node definition id for this tier.
    pub fn node_def_id(self) -> &'static str {
        match self {
            DeviceVariant::Basic => "basicroomba",
            DeviceVariant::BinDetect => "series800roomba",
            DeviceVariant::Position => "series900roomba",
            DeviceVariant::CarpetBoost => "roomba980",
            DeviceVariant::DockComm => "roombai7",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceVariant::Basic => "Basic Roomba",
            DeviceVariant::BinDetect => "Series 800 Roomba",
            DeviceVariant::Position => "Series 900 Roomba",
            DeviceVariant::CarpetBoost => "Roomba 980",
            DeviceVariant::DockComm => "Roomba i7",
        }
    }

    /// Properties exposed by this tier, in hub order.
    pub fn properties(self) -> Vec<PropertyId> {
        let mut ids = BASIC_PROPERTIES.to_vec();
        if self >= DeviceVariant::BinDetect {
            ids.extend_from_slice(BIN_DETECT_PROPERTIES);
        }
        if self >= DeviceVariant::Position {
            ids.extend_from_slice(POSITION_PROPERTIES);
        }
        if self >= DeviceVariant::CarpetBoost {
            ids.extend_from_slice(CARPET_BOOST_PROPERTIES);
        }
        ids
    }

    /// Commands accepted by this tier.
    pub fn commands(self) -> Vec<CommandKind> {
        let mut kinds = BASIC_COMMANDS.to_vec();
        if self >= DeviceVariant::BinDetect {
            kinds.push(CommandKind::SetBinFinish);
        }
        if self >= DeviceVariant::Position {
            kinds.push(CommandKind::SetPasses);
            kinds.push(CommandKind::SetEdgeClean);
        }
        if self >= DeviceVariant::CarpetBoost {
            kinds.push(CommandKind::SetFanSpeed);
        }
        kinds
    }

    pub fn supports(self, kind: CommandKind) -> bool {
        self.commands().contains(&kind)
    }

    pub fn exposes(self, id: PropertyId) -> bool {
        self.properties().contains(&id)
    }
}

impl fmt::Display for DeviceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Hub-facing command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Start,
    Stop,
    Pause,
    Resume,
    Dock,
    Query,
    SetBinFinish,
    SetPasses,
    SetEdgeClean,
    SetFanSpeed,
}

impl CommandKind {
    pub fn hub_id(self) -> &'static str {
        match self {
            CommandKind::Start => "DON",
            CommandKind::Stop => "DOF",
            CommandKind::Pause => "PAUSE",
            CommandKind::Resume => "RESUME",
            CommandKind::Dock => "DOCK",
            CommandKind::Query => "QUERY",
            CommandKind::SetBinFinish => "SET_BIN_FINISH",
            CommandKind::SetPasses => "SET_PASSES",
            CommandKind::SetEdgeClean => "SET_EDGE_CLEAN",
            CommandKind::SetFanSpeed => "SET_FAN_SPEED",
        }
    }

    /// Whether the command carries a scalar argument.
    pub fn takes_value(self) -> bool {
        matches!(
            self,
            CommandKind::SetBinFinish
                | CommandKind::SetPasses
                | CommandKind::SetEdgeClean
                | CommandKind::SetFanSpeed
        )
    }
}

/// Returned when a hub command id is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command id: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for CommandKind {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "DON" => CommandKind::Start,
            "DOF" => CommandKind::Stop,
            "PAUSE" => CommandKind::Pause,
            "RESUME" => CommandKind::Resume,
            "DOCK" => CommandKind::Dock,
            "QUERY" => CommandKind::Query,
            "SET_BIN_FINISH" => CommandKind::SetBinFinish,
            "SET_PASSES" => CommandKind::SetPasses,
            "SET_EDGE_CLEAN" => CommandKind::SetEdgeClean,
            "SET_FAN_SPEED" => CommandKind::SetFanSpeed,
            other => return Err(UnknownCommand(other.to_string())),
        };
        Ok(kind)
    }
}
