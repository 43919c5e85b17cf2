//! Live device sessions.
//!
//! The long-lived connection to a robot's state channel is provided by an
//! external session library which owns reconnects and keepalives.  The hub
//! only needs it through the narrow [`DeviceSession`] trait: read the latest
//! state snapshot, check the connected flag, and issue discrete writes.
//!
//! [`SessionConnector`] opens a session for a [`DeviceRecord`] that already
//! carries its credential.  The `mock` sub-module provides in-memory
//! implementations of both traits.

pub mod mock;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use roomba_core::{DeviceId, DeviceRecord};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The record has no credential yet.
    #[error("device {0} has no credential")]
    MissingCredential(DeviceId),

    /// The session could not be opened.
    #[error("failed to connect to {device_id}: {reason}")]
    ConnectFailed { device_id: DeviceId, reason: String },

    /// The session is not currently connected.
    #[error("session is not connected")]
    NotConnected,

    /// The robot rejected or failed to acknowledge a write.
    #[error("robot rejected {operation}: {reason}")]
    Rejected { operation: String, reason: String },

    /// A transport-level failure.
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mission commands the robot accepts on its command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionCommand {
    Start,
    Stop,
    Pause,
    Resume,
    Dock,
}

impl SessionCommand {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionCommand::Start => "start",
            SessionCommand::Stop => "stop",
            SessionCommand::Pause => "pause",
            SessionCommand::Resume => "resume",
            SessionCommand::Dock => "dock",
        }
    }
}

impl fmt::Display for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open session to one robot.
///
/// Implementations are updated concurrently by the session library; the hub
/// treats `snapshot` as a point-in-time copy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// The latest full state document (`{"state": {"reported": {...}}}`).
    fn snapshot(&self) -> Value;

    /// Whether the underlying connection is currently up.
    fn is_connected(&self) -> bool;

    async fn send_command(&self, command: SessionCommand) -> Result<(), SessionError>;

    /// Writes a single boolean preference.
    async fn set_preference(&self, key: &str, value: bool) -> Result<(), SessionError>;

    async fn disconnect(&self);
}

/// Opens sessions for credentialed device records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, record: &DeviceRecord) -> Result<Arc<dyn DeviceSession>, SessionError>;
}

/// Placeholder [`SessionConnector`] used when no session backend is
/// configured.  Every connect is logged and fails, so robots stay
/// registered but unsynchronized.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedConnector;

#[async_trait]
impl SessionConnector for DetachedConnector {
    async fn connect(&self, record: &DeviceRecord) -> Result<Arc<dyn DeviceSession>, SessionError> {
        warn!(
            "no session backend is configured; {} stays disconnected",
            record.robot_name
        );
        Err(SessionError::ConnectFailed {
            device_id: record.device_id.clone(),
            reason: "no session backend is configured".to_string(),
        })
    }
}
