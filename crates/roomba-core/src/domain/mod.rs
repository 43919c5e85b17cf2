//! Domain entities for the Roomba hub integration.
//!
//! Pure data and decision logic with no sockets, file system, or runtime
//! dependencies, so everything here is unit-tested in isolation.
//!
//! - **`device`** – [`device::DeviceRecord`], what discovery learns about a robot.
//! - **`capability`** – the advertised capability set and the tier classifier.
//! - **`variant`** – feature tiers and their property/command tables.
//! - **`property`** – typed hub properties and the per-device property set.
//! - **`mission`** – mission phase and fault code tables.
//! - **`settings`** – two-boolean cleaning preferences (passes, fan speed, bin).
//! - **`signal`** – RSSI → quality conversion and publish hysteresis.

pub mod capability;
pub mod device;
pub mod mission;
pub mod property;
pub mod settings;
pub mod signal;
pub mod variant;
