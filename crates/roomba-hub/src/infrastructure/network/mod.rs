//! Network infrastructure for the hub integration.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Broadcasts the UDP beacon probe and collects robot
//!   replies into [`roomba_core::DeviceRecord`]s.
//!
//! - **`bootstrap`** – Retrieves a robot's credential over TLS, retrying
//!   until the operator has put the robot into pairing mode.
//!
//! - **`tls`** – The OpenSSL connector robots require (self-signed
//!   certificates, static-RSA cipher suites).

pub mod bootstrap;
pub mod discovery;
pub mod tls;
