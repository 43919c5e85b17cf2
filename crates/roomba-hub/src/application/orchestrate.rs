//! Orchestrator: discovery, bootstrap, connection and polling per robot.
//!
//! ```text
//! startup ──► load registry ──► (empty?) discover + bootstrap ──► connect all
//!
//! connect ──► Connecting ──► AwaitingFirstState ──► classify ──► Synchronized
//!                               (poll snapshot           │
//!                                until cap appears)      └─► poll task
//! ```
//!
//! Discovery and bootstrap block on sockets and run together on one
//! `spawn_blocking` worker, never on the async control path.  Each
//! synchronized robot gets its own polling task.  Lifecycle transitions of
//! one robot are serialized by its device mutex, which is not held while a
//! connect waits for the first state; different robots progress
//! independently.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use roomba_core::{classify, CapabilitySet, CommandKind, DeviceId, DeviceRecord, DeviceVariant, PropertySet};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::dispatch_commands::{execute, plan, CommandAction};
use super::manage_devices::{ConnectionState, DeviceHandle, DeviceRegistry, ManagedDevice};
use super::sync_state::refresh;
use crate::infrastructure::hub::{HubError, HubPort, NOTICE_PASSWORD, NOTICE_SETUP};
use crate::infrastructure::network::bootstrap::BootstrapError;
use crate::infrastructure::network::discovery::DiscoveryError;
use crate::infrastructure::session::{DeviceSession, SessionConnector, SessionError};
use crate::infrastructure::storage::config::AppConfig;
use crate::infrastructure::storage::registry::{DeviceStore, StoreError};

/// Shortest poll period accepted, whatever the configuration says.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How often [`Orchestrator::run`] checks the shutdown flag.
const RUN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Error type for orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("device registry error: {0}")]
    Store(#[from] StoreError),

    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("hub error: {0}")]
    Hub(#[from] HubError),

    /// Shutdown was requested while waiting for the robot's first state.
    #[error("connection to {0} cancelled")]
    Cancelled(DeviceId),

    /// A newer connect took over the robot's session while this one was
    /// waiting.
    #[error("connection to {0} superseded by a newer connect")]
    Superseded(DeviceId),

    /// The robot has no registry entry, or was removed mid-connect.
    #[error("robot {0} is not registered")]
    NotRegistered(DeviceId),

    /// The blocking discovery worker panicked or was cancelled.
    #[error("discovery worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Finds robots on the network.  Blocking.
pub trait DeviceScanner: Send + Sync {
    fn scan(&self) -> Result<Vec<DeviceRecord>, DiscoveryError>;
}

/// Retrieves a robot's credential.  Blocking.
pub trait CredentialProvider: Send + Sync {
    fn fetch_credential(&self, record: &DeviceRecord) -> Result<String, BootstrapError>;
}

/// Everything the orchestrator talks to.
pub struct Collaborators {
    pub scanner: Arc<dyn DeviceScanner>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub connector: Arc<dyn SessionConnector>,
    pub hub: Arc<dyn HubPort>,
    pub store: Arc<dyn DeviceStore>,
}

/// Timing of the connection and polling loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    /// How often a fresh session is checked for its first state.
    pub state_wait_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            state_wait_interval: Duration::from_secs(1),
        }
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.hub.poll_interval(),
            state_wait_interval: config.session.state_wait_interval(),
        }
    }
}

/// Point-in-time view of one robot.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    pub name: String,
    pub address: String,
    pub state: ConnectionState,
    pub variant: Option<DeviceVariant>,
    pub properties: PropertySet,
}

impl DeviceStatus {
    fn of(device: &ManagedDevice) -> Self {
        Self {
            device_id: device.device_id().to_string(),
            name: device.name().to_string(),
            address: device.address().to_string(),
            state: device.state(),
            variant: device.variant(),
            properties: device.properties().clone(),
        }
    }
}

/// Pending connection attempt started by [`Orchestrator::connect_all`].
pub type ConnectTask = JoinHandle<Result<DeviceVariant, OrchestratorError>>;

/// Sequences discovery, bootstrap, connection and polling for every robot.
pub struct Orchestrator {
    scanner: Arc<dyn DeviceScanner>,
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn SessionConnector>,
    hub: Arc<dyn HubPort>,
    store: Arc<dyn DeviceStore>,
    registry: Mutex<DeviceRegistry>,
    settings: OrchestratorSettings,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        settings: OrchestratorSettings,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            scanner: collaborators.scanner,
            credentials: collaborators.credentials,
            connector: collaborators.connector,
            hub: collaborators.hub,
            store: collaborators.store,
            registry: Mutex::new(DeviceRegistry::new()),
            settings,
            running,
        }
    }

    /// Loads persisted records into the registry and returns how many there
    /// were.
    pub async fn load_known(&self) -> Result<usize, OrchestratorError> {
        let records = self.store.load()?;
        let count = records.len();
        let mut registry = self.registry.lock().await;
        for record in records {
            registry.upsert(record);
        }
        debug!("loaded {count} known robot(s)");
        Ok(count)
    }

    /// Startup sequence: load the registry, discover when it is empty, then
    /// connect every robot that has a credential.
    pub async fn start(self: &Arc<Self>) -> Result<Vec<ConnectTask>, OrchestratorError> {
        if self.load_known().await? == 0 {
            info!("no known robots; starting discovery");
            self.discover_devices().await?;
        }
        self.hub.clear_notices();
        Ok(self.connect_all().await)
    }

    /// Runs the integration until the shared `running` flag is cleared, then
    /// closes every session.
    pub async fn run(self: &Arc<Self>) -> Result<(), OrchestratorError> {
        let tasks = self.start().await?;
        info!("started {} connection(s)", tasks.len());
        while self.running.load(Ordering::Relaxed) {
            tokio::time::sleep(RUN_CHECK_INTERVAL).await;
        }
        info!("stopping");
        for task in &tasks {
            task.abort();
        }
        self.shutdown().await;
        Ok(())
    }

    /// Operator-triggered discovery: drop every session, rescan, bootstrap,
    /// persist and reconnect.
    pub async fn rediscover(self: &Arc<Self>) -> Result<Vec<ConnectTask>, OrchestratorError> {
        self.disconnect_all().await;
        let found = self.discover_devices().await?;
        self.hub.clear_notices();
        if found.is_empty() {
            warn!("discovery found no robots");
        }
        Ok(self.connect_all().await)
    }

    /// Scans, bootstraps the robots that still lack a credential and
    /// persists the registry.  Returns the robots found by this scan.
    ///
    /// Robots known from earlier runs but not found now stay registered.
    pub async fn discover_devices(&self) -> Result<Vec<DeviceRecord>, OrchestratorError> {
        let known: HashMap<DeviceId, DeviceRecord> = self
            .registry
            .lock()
            .await
            .records()
            .into_iter()
            .map(|r| (r.device_id.clone(), r))
            .collect();

        let scanner = Arc::clone(&self.scanner);
        let credentials = Arc::clone(&self.credentials);
        let hub = Arc::clone(&self.hub);
        let found = tokio::task::spawn_blocking(move || {
            scan_and_bootstrap(scanner.as_ref(), credentials.as_ref(), hub.as_ref(), &known)
        })
        .await??;

        let all = {
            let mut registry = self.registry.lock().await;
            for record in &found {
                registry.upsert(record.clone());
            }
            registry.records()
        };
        self.store.save(&all)?;
        info!("{} robot(s) known after discovery", all.len());
        Ok(found)
    }

    /// Starts a connection task for every credentialed robot.
    pub async fn connect_all(self: &Arc<Self>) -> Vec<ConnectTask> {
        let records = self.registry.lock().await.records();
        let mut tasks = Vec::new();
        for record in records {
            if !record.has_credential() {
                warn!(
                    "skipping {}: no credential yet, run discovery to pair it",
                    record.robot_name
                );
                continue;
            }
            let this = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let name = record.robot_name.clone();
                let result = this.connect_device(record).await;
                if let Err(e) = &result {
                    warn!("failed to connect to {name}: {e}");
                }
                result
            }));
        }
        tasks
    }

    /// Connects one robot and brings it to `Synchronized`.
    ///
    /// Waits without a timeout for the robot's first state.  The device lock
    /// is released while waiting, so removal or a newer connect can proceed.
    /// Removal ends this attempt with [`OrchestratorError::NotRegistered`], a
    /// newer connect with [`OrchestratorError::Superseded`].  A
    /// robot seen before is rebound to its existing node and property values.
    pub async fn connect_device(&self, record: DeviceRecord) -> Result<DeviceVariant, OrchestratorError> {
        let device_id = record.device_id.clone();
        let (handle, record) = {
            let mut registry = self.registry.lock().await;
            let handle = registry.upsert(record);
            // The registry may have supplied a known credential.
            let record = registry.record(&device_id).cloned();
            (handle, record)
        };
        let Some(record) = record else {
            return Err(OrchestratorError::NotRegistered(device_id));
        };

        let session = {
            let mut device = handle.lock().await;
            device.detach().await;
            device.refresh_identity(&record);
            device.begin_connect();
            self.hub.add_notice(
                NOTICE_SETUP,
                &format!("Initializing connection to {}", record.robot_name),
            );
            info!("connecting to {} at {}", record.robot_name, record.ip);

            let session = match self.connector.connect(&record).await {
                Ok(session) => session,
                Err(e) => {
                    self.abandon(&mut device).await;
                    return Err(e.into());
                }
            };
            device.attach_session(Arc::clone(&session));
            session
        };

        let capabilities = match self.wait_for_capabilities(&handle, &session, &record).await {
            Ok(capabilities) => capabilities,
            Err(e) => {
                let mut device = handle.lock().await;
                if device.holds_session(&session) {
                    self.abandon(&mut device).await;
                } else {
                    self.hub.clear_notices();
                }
                return Err(e);
            }
        };
        let detected = classify(&CapabilitySet::new(capabilities));

        let mut device = handle.lock().await;
        let current = match self.check_registered(&device_id, &handle).await {
            Ok(()) if device.holds_session(&session) => Ok(()),
            Ok(()) => Err(OrchestratorError::Superseded(device_id.clone())),
            Err(e) => Err(e),
        };
        if let Err(e) = current {
            self.hub.clear_notices();
            return Err(e);
        }
        let variant = match device.variant() {
            Some(existing) => {
                info!("{} already exists, rebinding session", device.name());
                if existing != detected {
                    debug!("{} now reports {detected}; keeping {existing}", device.name());
                }
                existing
            }
            None => {
                info!("adding {} as {detected}", device.name());
                if let Err(e) = self.hub.add_node(device.address(), device.name(), detected) {
                    self.abandon(&mut device).await;
                    return Err(e.into());
                }
                detected
            }
        };
        device.mark_synchronized(variant);
        refresh(&mut device, self.hub.as_ref(), false);
        device.set_poller(tokio::spawn(poll_loop(
            Arc::clone(&handle),
            Arc::clone(&self.hub),
            self.settings.poll_interval,
            Arc::clone(&self.running),
        )));
        self.hub.clear_notices();
        Ok(variant)
    }

    async fn abandon(&self, device: &mut ManagedDevice) {
        device.detach().await;
        self.hub.clear_notices();
    }

    /// Fails with [`OrchestratorError::NotRegistered`] unless `handle` is
    /// still the registry entry for `device_id`.
    async fn check_registered(&self, device_id: &str, handle: &DeviceHandle) -> Result<(), OrchestratorError> {
        let registered = self
            .registry
            .lock()
            .await
            .get(device_id)
            .is_some_and(|registered| Arc::ptr_eq(&registered, handle));
        if registered {
            Ok(())
        } else {
            Err(OrchestratorError::NotRegistered(device_id.to_string()))
        }
    }

    /// Like [`Self::check_registered`], and also fails with
    /// [`OrchestratorError::Superseded`] once `session` is no longer attached.
    async fn check_current(
        &self,
        device_id: &str,
        handle: &DeviceHandle,
        session: &Arc<dyn DeviceSession>,
    ) -> Result<(), OrchestratorError> {
        self.check_registered(device_id, handle).await?;
        if handle.lock().await.holds_session(session) {
            Ok(())
        } else {
            Err(OrchestratorError::Superseded(device_id.to_string()))
        }
    }

    /// Polls `session` until its state carries a non-empty capability
    /// descriptor.  Neither lock is held between polls.
    async fn wait_for_capabilities(
        &self,
        handle: &DeviceHandle,
        session: &Arc<dyn DeviceSession>,
        record: &DeviceRecord,
    ) -> Result<Map<String, Value>, OrchestratorError> {
        loop {
            let snapshot = session.snapshot();
            match snapshot.pointer("/state/reported/cap") {
                Some(Value::Object(cap)) if !cap.is_empty() => return Ok(cap.clone()),
                _ => debug!("waiting for first state from {}", record.robot_name),
            }
            if !self.running.load(Ordering::Relaxed) {
                return Err(OrchestratorError::Cancelled(record.device_id.clone()));
            }
            self.check_current(&record.device_id, handle, session).await?;
            tokio::time::sleep(self.settings.state_wait_interval).await;
        }
    }

    /// Runs a hub command against a robot.  Returns whether it succeeded.
    pub async fn handle_command(&self, device_id: &str, command_id: &str, value: Option<i64>) -> bool {
        let kind = match command_id.parse::<CommandKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!("{e}");
                return false;
            }
        };
        let handle = self.registry.lock().await.get(device_id);
        let Some(handle) = handle else {
            warn!("{command_id} for unknown robot {device_id}");
            return false;
        };

        let mut device = handle.lock().await;
        let (Some(variant), Some(session)) = (device.variant(), device.session()) else {
            warn!("{} is not connected; ignoring {command_id}", device.name());
            return false;
        };
        if device.state() != ConnectionState::Synchronized {
            warn!("{} is {}; ignoring {command_id}", device.name(), device.state());
            return false;
        }

        let action = match plan(variant, kind, value) {
            Ok(action) => action,
            Err(e) => {
                warn!("rejected command for {}: {e}", device.name());
                return false;
            }
        };
        if action == CommandAction::Refresh {
            refresh(&mut device, self.hub.as_ref(), true);
            return true;
        }
        execute(session.as_ref(), device.name(), &action).await
    }

    /// Disconnects a robot, drops its node and forgets it.
    ///
    /// Returns `false` when the robot was not known.
    pub async fn remove_device(&self, device_id: &str) -> Result<bool, OrchestratorError> {
        let (handle, remaining) = {
            let mut registry = self.registry.lock().await;
            let handle = registry.remove(device_id);
            (handle, registry.records())
        };
        let Some(handle) = handle else {
            return Ok(false);
        };

        {
            let mut device = handle.lock().await;
            device.detach().await;
            if device.variant().is_some() {
                if let Err(e) = self.hub.remove_node(device.address()) {
                    warn!("failed to remove node for {}: {e}", device.name());
                }
            }
        }
        self.store.save(&remaining)?;
        info!("removed robot {device_id}");
        Ok(true)
    }

    /// Closes every session.  Registry entries and property values stay.
    pub async fn disconnect_all(&self) {
        let handles = self.registry.lock().await.handles();
        for handle in handles {
            handle.lock().await.detach().await;
        }
    }

    /// Stops all loops and closes every session.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.disconnect_all().await;
    }

    pub async fn records(&self) -> Vec<DeviceRecord> {
        self.registry.lock().await.records()
    }

    pub async fn device_status(&self, device_id: &str) -> Option<DeviceStatus> {
        let handle = self.registry.lock().await.get(device_id)?;
        let device = handle.lock().await;
        Some(DeviceStatus::of(&device))
    }
}

/// Blocking half of discovery: scan, then fetch missing credentials one
/// robot at a time.
fn scan_and_bootstrap(
    scanner: &dyn DeviceScanner,
    credentials: &dyn CredentialProvider,
    hub: &dyn HubPort,
    known: &HashMap<DeviceId, DeviceRecord>,
) -> Result<Vec<DeviceRecord>, OrchestratorError> {
    let mut found = scanner.scan()?;
    for record in &mut found {
        if let Some(previous) = known.get(&record.device_id) {
            record.inherit_credential(previous);
        }
        if record.has_credential() {
            continue;
        }

        hub.add_notice(NOTICE_PASSWORD, &pairing_notice(&record.robot_name));
        match credentials.fetch_credential(record) {
            Ok(credential) => record.credential = Some(credential),
            Err(e) => warn!("no credential for {}: {e}", record.robot_name),
        }
    }
    Ok(found)
}

fn pairing_notice(name: &str) -> String {
    format!(
        "Make sure {name} is on its Home Base and powered. Press and hold HOME \
         until it plays a series of tones, then release. The Wi-Fi indicator \
         will flash."
    )
}

/// Publishes one robot's state every `interval` until shutdown or abort.
async fn poll_loop(
    handle: DeviceHandle,
    hub: Arc<dyn HubPort>,
    interval: Duration,
    running: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; connect has just refreshed.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
        let mut device = handle.lock().await;
        if device.state() == ConnectionState::Synchronized {
            refresh(&mut device, hub.as_ref(), false);
        }
    }
}
