//! Home-automation hub boundary.
//!
//! The hub owns its node registry and operator notices.  The integration
//! reaches it only through [`HubPort`]: create a node for a robot, publish
//! property values to it, and post or clear advisory notices.
//!
//! [`LoggingHub`] is the adapter the headless binary uses; it writes every
//! interaction to the log.  The `recording` sub-module keeps interactions in
//! memory for assertions.

pub mod recording;

use roomba_core::{DeviceVariant, PropertyUpdate};
use thiserror::Error;
use tracing::info;

/// Notice key shown while a credential is being bootstrapped.
pub const NOTICE_PASSWORD: &str = "passwd";
/// Notice key shown while a session is being initialised.
pub const NOTICE_SETUP: &str = "setup";

/// Error type for hub interactions.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub refused to create the node.
    #[error("hub rejected node {address}: {reason}")]
    NodeRejected { address: String, reason: String },

    /// The hub has no node with this address.
    #[error("no hub node at {0}")]
    UnknownNode(String),
}

/// Operations the integration performs on the hub.
pub trait HubPort: Send + Sync {
    /// Creates the node for a robot.  `variant` selects the node definition.
    fn add_node(&self, address: &str, name: &str, variant: DeviceVariant) -> Result<(), HubError>;

    fn remove_node(&self, address: &str) -> Result<(), HubError>;

    /// Writes property values to an existing node.
    fn publish(&self, address: &str, updates: &[PropertyUpdate]) -> Result<(), HubError>;

    fn add_notice(&self, key: &str, text: &str);

    fn clear_notices(&self);
}

/// [`HubPort`] that logs every call and accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHub;

impl HubPort for LoggingHub {
    fn add_node(&self, address: &str, name: &str, variant: DeviceVariant) -> Result<(), HubError> {
        info!(
            "adding {variant}: {name} ({address}) as {}",
            variant.node_def_id()
        );
        Ok(())
    }

    fn remove_node(&self, address: &str) -> Result<(), HubError> {
        info!("removing node {address}");
        Ok(())
    }

    fn publish(&self, address: &str, updates: &[PropertyUpdate]) -> Result<(), HubError> {
        for update in updates {
            info!(
                "{address} {}={} (uom {})",
                update.id,
                update.value,
                update.id.uom().code()
            );
        }
        Ok(())
    }

    fn add_notice(&self, key: &str, text: &str) {
        info!("notice [{key}]: {text}");
    }

    fn clear_notices(&self) {
        info!("notices cleared");
    }
}
