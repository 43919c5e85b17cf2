//! TOML-based configuration for the hub integration.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\RoombaHub\config.toml`
//! - Linux:    `~/.config/roomba-hub/config.toml`
//! - macOS:    `~/Library/Application Support/RoombaHub/config.toml`
//!
//! Example:
//!
//! ```toml
//! [hub]
//! log_level = "debug"
//! poll_interval_secs = 10
//!
//! [discovery]
//! broadcast_address = "192.168.1.255"
//! attempts = 5
//!
//! [bootstrap]
//! retry_backoff_secs = 5
//! max_attempts = 60
//! ```
//!
//! Every field has a `#[serde(default = "...")]` so a missing file, a missing
//! section, or a missing key all fall back to the defaults below.  The device
//! registry (`devices.json`) lives in the same directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use roomba_core::protocol::{CREDENTIAL_PORT, DISCOVERY_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the persisted device registry.
pub const REGISTRY_FILE_NAME: &str = "devices.json";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// General integration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds between state polls of each device.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Beacon scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// Broadcast address to probe.  When absent the first non-loopback
    /// IPv4 interface's broadcast address is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_address: Option<String>,
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Pause between attempts, in milliseconds.
    #[serde(default = "default_attempt_interval_ms")]
    pub attempt_interval_ms: u64,
}

/// Credential bootstrap settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BootstrapConfig {
    #[serde(default = "default_credential_port")]
    pub port: u16,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// Connect and read timeout for each attempt.
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,
    /// Attempts before giving up.  Absent means retry until shutdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

/// Session start-up settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// How often to re-check a new session for its first full state.
    #[serde(default = "default_state_wait_interval_ms")]
    pub state_wait_interval_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_poll_interval_secs() -> u64 {
    10
}
fn default_discovery_port() -> u16 {
    DISCOVERY_PORT
}
fn default_attempts() -> u32 {
    5
}
fn default_attempt_timeout_secs() -> u64 {
    7
}
fn default_attempt_interval_ms() -> u64 {
    1000
}
fn default_credential_port() -> u16 {
    CREDENTIAL_PORT
}
fn default_retry_backoff_secs() -> u64 {
    5
}
fn default_socket_timeout_secs() -> u64 {
    10
}
fn default_state_wait_interval_ms() -> u64 {
    1000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            broadcast_address: None,
            port: default_discovery_port(),
            attempts: default_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            attempt_interval_ms: default_attempt_interval_ms(),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            port: default_credential_port(),
            retry_backoff_secs: default_retry_backoff_secs(),
            socket_timeout_secs: default_socket_timeout_secs(),
            max_attempts: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_wait_interval_ms: default_state_wait_interval_ms(),
        }
    }
}

impl HubConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl SessionConfig {
    pub fn state_wait_interval(&self) -> Duration {
        Duration::from_millis(self.state_wait_interval_ms)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Path of the device registry that sits next to `config_path`.
pub fn registry_path_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|dir| dir.join(REGISTRY_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(REGISTRY_FILE_NAME))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads `AppConfig` from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `RoombaHub`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RoombaHub"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("roomba-hub"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RoombaHub")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("roomba_hub_cfg_{}", Uuid::new_v4()))
    }

    #[test]
    fn test_app_config_default_matches_robot_protocol() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.discovery.port, 5678);
        assert_eq!(cfg.discovery.attempts, 5);
        assert_eq!(cfg.discovery.attempt_timeout_secs, 7);
        assert_eq!(cfg.discovery.attempt_interval_ms, 1000);
        assert_eq!(cfg.bootstrap.port, 8883);
        assert_eq!(cfg.bootstrap.retry_backoff_secs, 5);
        assert_eq!(cfg.bootstrap.socket_timeout_secs, 10);
        assert_eq!(cfg.bootstrap.max_attempts, None);
        assert_eq!(cfg.hub.poll_interval(), Duration::from_secs(10));
        assert_eq!(cfg.session.state_wait_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_hub_config_default_log_level_is_info() {
        assert_eq!(HubConfig::default().log_level, "info");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_given_keys() {
        // Arrange
        let toml_str = r#"
[discovery]
broadcast_address = "192.168.1.255"
attempts = 2

[bootstrap]
max_attempts = 12
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.discovery.broadcast_address.as_deref(), Some("192.168.1.255"));
        assert_eq!(cfg.discovery.attempts, 2);
        assert_eq!(cfg.discovery.attempt_timeout_secs, 7);
        assert_eq!(cfg.bootstrap.max_attempts, Some(12));
        assert_eq!(cfg.bootstrap.retry_backoff_secs, 5);
    }

    #[test]
    fn test_unset_optionals_are_omitted_from_toml() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        assert!(!toml_str.contains("broadcast_address"));
        assert!(!toml_str.contains("max_attempts"));
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        // Arrange
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = scratch_dir().join("config.toml");
        assert_eq!(load_config_from(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let dir = scratch_dir();
        let path = dir.join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.hub.log_level = "debug".to_string();
        cfg.bootstrap.max_attempts = Some(3);

        // Act
        save_config_to(&path, &cfg).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_registry_path_sits_next_to_config() {
        let path = PathBuf::from("/etc/roomba-hub/config.toml");
        assert_eq!(
            registry_path_for(&path),
            PathBuf::from("/etc/roomba-hub/devices.json")
        );
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }
}
