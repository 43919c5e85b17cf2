//! Device registry and per-device connection state.
//!
//! The [`DeviceRegistry`] is the hub's in-memory table of every robot it has
//! discovered or loaded from storage.  Each entry pairs the last-known
//! [`DeviceRecord`] with a [`DeviceHandle`], the async-mutex-guarded runtime
//! state of that robot.
//!
//! # Connection lifecycle
//!
//! ```text
//! Disconnected ──► Connecting ──► AwaitingFirstState ──► Synchronized
//!      ▲                                                      │
//!      └──────────────────────── detach ──────────────────────┘
//! ```
//!
//! - `Connecting`: the session is being opened.
//! - `AwaitingFirstState`: the session is open but has not yet reported a
//!   non-empty capability descriptor.
//! - `Synchronized`: the variant is known and the device is polled.
//!
//! Lock order is registry first, then device.  The registry lock is never
//! held across a session call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use roomba_core::{DeviceId, DeviceRecord, DeviceVariant, PropertySet, PropertyUpdate};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::sync_state::StateSynchronizer;
use crate::infrastructure::session::DeviceSession;

/// Connection state of one robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingFirstState,
    Synchronized,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingFirstState => "awaiting first state",
            ConnectionState::Synchronized => "synchronized",
        };
        f.write_str(text)
    }
}

/// Runtime state of one robot.
///
/// The variant and property set survive a detach so that a later session
/// for the same device id rebinds to them instead of starting over.
pub struct ManagedDevice {
    device_id: DeviceId,
    name: String,
    address: String,
    state: ConnectionState,
    variant: Option<DeviceVariant>,
    properties: PropertySet,
    synchronizer: StateSynchronizer,
    session: Option<Arc<dyn DeviceSession>>,
    poller: Option<JoinHandle<()>>,
}

impl ManagedDevice {
    pub fn new(record: &DeviceRecord) -> Self {
        Self {
            device_id: record.device_id.clone(),
            name: record.robot_name.clone(),
            address: record.node_address(),
            state: ConnectionState::Disconnected,
            variant: None,
            properties: PropertySet::default(),
            synchronizer: StateSynchronizer::new(),
            session: None,
            poller: None,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hub node address.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The classified variant, once the first state has been seen.
    pub fn variant(&self) -> Option<DeviceVariant> {
        self.variant
    }

    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }

    pub fn session(&self) -> Option<Arc<dyn DeviceSession>> {
        self.session.clone()
    }

    /// Whether `session` is the one currently attached.
    pub fn holds_session(&self, session: &Arc<dyn DeviceSession>) -> bool {
        self.session.as_ref().is_some_and(|current| {
            Arc::as_ptr(current).cast::<()>() == Arc::as_ptr(session).cast::<()>()
        })
    }

    /// Picks up a renamed robot.  The address is derived from the device id
    /// and never changes.
    pub fn refresh_identity(&mut self, record: &DeviceRecord) {
        self.name = record.robot_name.clone();
    }

    pub fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Attaches an open session that has not yet reported its state.
    pub fn attach_session(&mut self, session: Arc<dyn DeviceSession>) {
        self.session = Some(session);
        self.state = ConnectionState::AwaitingFirstState;
    }

    /// Records the classified variant and marks the device synchronized.
    ///
    /// Returns `true` the first time a variant is set.  A device that was
    /// classified before keeps its original variant and property values.
    pub fn mark_synchronized(&mut self, variant: DeviceVariant) -> bool {
        self.state = ConnectionState::Synchronized;
        if self.variant.is_some() {
            return false;
        }
        self.variant = Some(variant);
        self.properties = PropertySet::with_properties(&variant.properties());
        true
    }

    pub fn set_poller(&mut self, poller: JoinHandle<()>) {
        if let Some(previous) = self.poller.replace(poller) {
            previous.abort();
        }
    }

    /// Runs the synchronizer over `snapshot` and folds the result into the
    /// property set.  Does nothing before classification.
    pub fn apply_snapshot(&mut self, snapshot: &Value, connected: bool) -> Vec<PropertyUpdate> {
        let Some(variant) = self.variant else {
            return Vec::new();
        };
        let updates = self
            .synchronizer
            .sync(&self.name, variant, snapshot, connected);
        for update in &updates {
            self.properties.apply(*update);
        }
        updates
    }

    /// Stops polling, closes the session and returns to `Disconnected`.
    pub async fn detach(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if let Some(session) = self.session.take() {
            debug!("closing session to {}", self.name);
            session.disconnect().await;
        }
        self.state = ConnectionState::Disconnected;
    }
}

/// Shared handle to one robot's runtime state.
pub type DeviceHandle = Arc<Mutex<ManagedDevice>>;

struct DeviceEntry {
    record: DeviceRecord,
    handle: DeviceHandle,
}

/// In-memory registry of every known robot, keyed by device id.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, DeviceEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or updates a robot and returns its handle.
    ///
    /// An existing entry keeps its handle, so any live state is preserved,
    /// and lends its credential to a record that arrives without one.
    pub fn upsert(&mut self, mut record: DeviceRecord) -> DeviceHandle {
        match self.devices.get_mut(&record.device_id) {
            Some(entry) => {
                record.inherit_credential(&entry.record);
                entry.record = record;
                Arc::clone(&entry.handle)
            }
            None => {
                let handle = Arc::new(Mutex::new(ManagedDevice::new(&record)));
                self.devices.insert(
                    record.device_id.clone(),
                    DeviceEntry {
                        record,
                        handle: Arc::clone(&handle),
                    },
                );
                handle
            }
        }
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceHandle> {
        self.devices.get(device_id).map(|e| Arc::clone(&e.handle))
    }

    pub fn record(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.devices.get(device_id).map(|e| &e.record)
    }

    /// Every known record, ordered by device id.
    pub fn records(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> =
            self.devices.values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        records
    }

    pub fn handles(&self) -> Vec<DeviceHandle> {
        self.devices.values().map(|e| Arc::clone(&e.handle)).collect()
    }

    /// Removes a robot, returning its handle so the caller can detach it.
    pub fn remove(&mut self, device_id: &str) -> Option<DeviceHandle> {
        self.devices.remove(device_id).map(|e| e.handle)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
