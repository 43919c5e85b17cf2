//! Application layer use cases for the hub integration.
//!
//! Use cases here sequence domain rules from `roomba-core` against the
//! abstractions defined in `infrastructure` (sessions, the hub, storage,
//! scanning and bootstrap).  They own no sockets and no files.
//!
//! # Sub-modules
//!
//! - **`manage_devices`** – The in-memory registry of known robots and the
//!   per-device connection state machine.
//!
//! - **`sync_state`** – Turns a session's state snapshot into typed property
//!   updates, one independent field group at a time.
//!
//! - **`dispatch_commands`** – Maps hub commands onto session commands and
//!   preference writes.
//!
//! - **`orchestrate`** – Startup, discovery, connection, polling and removal.

pub mod dispatch_commands;
pub mod manage_devices;
pub mod orchestrate;
pub mod sync_state;
