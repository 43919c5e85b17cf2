//! Infrastructure layer for the hub integration.
//!
//! Contains the adapters that touch the outside world: UDP and TLS sockets,
//! the device session library, the home-automation hub, and file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `roomba_core`; the domain in `roomba_core` never imports it.

pub mod hub;
pub mod network;
pub mod session;
pub mod storage;
