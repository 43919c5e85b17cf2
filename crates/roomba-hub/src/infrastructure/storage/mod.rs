//! Storage infrastructure: configuration and the known-device registry.
//!
//! - **`config`** – Reads and writes the TOML configuration from the
//!   platform-appropriate directory, with defaults for every field.
//! - **`registry`** – Persists the last-known record of every robot,
//!   credential included, so a restart can reconnect without rediscovery.

pub mod config;
pub mod registry;
