//! # roomba-core
//!
//! Shared library for the Roomba hub integration containing the device
//! model, capability tiers, typed property tables and the two wire codecs
//! the hub speaks itself.
//!
//! It has zero dependencies on sockets, the file system, or an async runtime.
//!
//! # Architecture overview
//!
//! The hub discovers robots on the local network, fetches a per-device
//! credential the robot only reveals after a physical button press, opens a
//! session to each robot (the session library is external) and maps the
//! robot's reported state into a small set of typed properties.
//!
//! - **`domain`** – Pure data and decision logic: the [`DeviceRecord`], the
//!   capability classifier that picks a [`DeviceVariant`], the per-variant
//!   property and command tables, mission/fault tables, preference
//!   encodings and Wi-Fi hysteresis.
//!
//! - **`protocol`** – How bytes look on the wire for the UDP beacon probe
//!   and the TLS credential frame.

pub mod domain;
pub mod protocol;

pub use domain::capability::{classify, CapabilitySet};
pub use domain::device::{device_id_from_hostname, DeviceId, DeviceRecord};
pub use domain::property::{PropertyId, PropertySet, PropertyUpdate, PropertyValue, Uom};
pub use domain::settings::{BinFullBehavior, CleaningPasses, FanSpeed, PreferenceWrite};
pub use domain::signal::{rssi_to_quality, SignalQualityState};
pub use domain::variant::{CommandKind, DeviceVariant, UnknownCommand};
pub use protocol::ProtocolError;
