//! Hub commands → session writes.
//!
//! A command is planned first ([`plan`]), which checks it against the
//! variant's command table and validates its argument without touching the
//! session.  The resulting [`CommandAction`] is then executed
//! ([`execute`]).  Failures are logged and reported as `false`; nothing is
//! retried.
//!
//! Tri-state settings always write both underlying preferences so the robot
//! never ends up in a mixed combination.

use roomba_core::domain::settings::edge_clean_preference_write;
use roomba_core::{
    BinFullBehavior, CleaningPasses, CommandKind, DeviceVariant, FanSpeed, PreferenceWrite,
};
use thiserror::Error;
use tracing::{error, info};

use crate::infrastructure::session::{DeviceSession, SessionCommand};

/// Hub value that turns edge cleaning on.
pub const EDGE_CLEAN_ON: i64 = 100;

/// Error type for command planning.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("{} is not supported by a {variant}", kind.hub_id())]
    Unsupported {
        kind: CommandKind,
        variant: DeviceVariant,
    },

    #[error("{} requires a value", .0.hub_id())]
    MissingValue(CommandKind),

    #[error("{value} is not a valid value for {}", kind.hub_id())]
    InvalidValue { kind: CommandKind, value: i64 },
}

/// What a command does to the robot.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    /// Send a mission command.
    Mission(SessionCommand),
    /// Write these preferences, in order.
    Preferences(Vec<PreferenceWrite>),
    /// Re-read the state and report every property.
    Refresh,
}

/// Validates `kind` for `variant` and works out what it should do.
///
/// # Errors
///
/// - [`CommandError::Unsupported`] when the variant's command table lacks
///   `kind`.
/// - [`CommandError::MissingValue`] / [`CommandError::InvalidValue`] for a
///   setting command without a usable argument.
pub fn plan(
    variant: DeviceVariant,
    kind: CommandKind,
    value: Option<i64>,
) -> Result<CommandAction, CommandError> {
    if !variant.supports(kind) {
        return Err(CommandError::Unsupported { kind, variant });
    }

    let required = || value.ok_or(CommandError::MissingValue(kind));
    let invalid = |value| CommandError::InvalidValue { kind, value };

    let action = match kind {
        CommandKind::Start => CommandAction::Mission(SessionCommand::Start),
        CommandKind::Stop => CommandAction::Mission(SessionCommand::Stop),
        CommandKind::Pause => CommandAction::Mission(SessionCommand::Pause),
        CommandKind::Resume => CommandAction::Mission(SessionCommand::Resume),
        CommandKind::Dock => CommandAction::Mission(SessionCommand::Dock),
        CommandKind::Query => CommandAction::Refresh,
        CommandKind::SetBinFinish => {
            let v = required()?;
            let behavior = BinFullBehavior::from_index(v).ok_or_else(|| invalid(v))?;
            CommandAction::Preferences(vec![behavior.preference_write()])
        }
        CommandKind::SetPasses => {
            let v = required()?;
            let passes = CleaningPasses::from_index(v).ok_or_else(|| invalid(v))?;
            CommandAction::Preferences(passes.preference_writes().to_vec())
        }
        CommandKind::SetEdgeClean => {
            let v = required()?;
            CommandAction::Preferences(vec![edge_clean_preference_write(v == EDGE_CLEAN_ON)])
        }
        CommandKind::SetFanSpeed => {
            let v = required()?;
            let speed = FanSpeed::from_index(v).ok_or_else(|| invalid(v))?;
            CommandAction::Preferences(speed.preference_writes().to_vec())
        }
    };
    Ok(action)
}

/// Carries out a planned action on `session`.
///
/// [`CommandAction::Refresh`] is the caller's job and succeeds trivially
/// here.  Preference writes stop at the first failure.
pub async fn execute(session: &dyn DeviceSession, name: &str, action: &CommandAction) -> bool {
    match action {
        CommandAction::Mission(command) => match session.send_command(*command).await {
            Ok(()) => {
                info!("sent {command} to {name}");
                true
            }
            Err(e) => {
                error!("failed to send {command} to {name}: {e}");
                false
            }
        },
        CommandAction::Preferences(writes) => {
            for (key, value) in writes {
                if let Err(e) = session.set_preference(key, *value).await {
                    error!("failed to set {key}={value} on {name}: {e}");
                    return false;
                }
                info!("set {key}={value} on {name}");
            }
            true
        }
        CommandAction::Refresh => true,
    }
}
