//! In-memory sessions for tests and offline runs.
//!
//! [`MockSession`] holds a mutable state document.  Preference writes are
//! reflected back into `state.reported` the way a real robot echoes them,
//! so a follow-up poll observes the new value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use roomba_core::{DeviceId, DeviceRecord};
use serde_json::{json, Value};

use super::{DeviceSession, SessionCommand, SessionConnector, SessionError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A scripted [`DeviceSession`].
pub struct MockSession {
    document: Mutex<Value>,
    connected: AtomicBool,
    reject_writes: AtomicBool,
    commands: Mutex<Vec<SessionCommand>>,
    preferences: Mutex<Vec<(String, bool)>>,
    disconnects: AtomicUsize,
}

impl MockSession {
    /// Creates a connected session whose document is `{"state": {"reported": reported}}`.
    pub fn with_reported(reported: Value) -> Self {
        Self::with_document(json!({ "state": { "reported": reported } }))
    }

    /// Creates a connected session with an arbitrary document.
    pub fn with_document(document: Value) -> Self {
        Self {
            document: Mutex::new(document),
            connected: AtomicBool::new(true),
            reject_writes: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
            preferences: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Replaces the whole state document.
    pub fn set_document(&self, document: Value) {
        *lock(&self.document) = document;
    }

    /// Sets one top-level field under `state.reported`.  No-op when the
    /// document has no `state.reported` object.
    pub fn set_reported(&self, key: &str, value: Value) {
        let mut document = lock(&self.document);
        if let Some(fields) = document
            .pointer_mut("/state/reported")
            .and_then(Value::as_object_mut)
        {
            fields.insert(key.to_string(), value);
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every subsequent command and preference write fail.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Commands accepted so far, in order.
    pub fn commands(&self) -> Vec<SessionCommand> {
        lock(&self.commands).clone()
    }

    /// Preference writes accepted so far, in order.
    pub fn preferences(&self) -> Vec<(String, bool)> {
        lock(&self.preferences).clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn check_writable(&self, operation: &str) -> Result<(), SessionError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SessionError::NotConnected);
        }
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(SessionError::Rejected {
                operation: operation.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceSession for MockSession {
    fn snapshot(&self) -> Value {
        lock(&self.document).clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_command(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.check_writable(command.as_str())?;
        lock(&self.commands).push(command);
        Ok(())
    }

    async fn set_preference(&self, key: &str, value: bool) -> Result<(), SessionError> {
        self.check_writable(key)?;
        lock(&self.preferences).push((key.to_string(), value));
        self.set_reported(key, Value::Bool(value));
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// A [`SessionConnector`] that hands out pre-registered [`MockSession`]s.
#[derive(Default)]
pub struct MockConnector {
    sessions: Mutex<HashMap<DeviceId, Arc<MockSession>>>,
    connects: Mutex<Vec<DeviceId>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the session returned for `device_id`.
    pub fn insert(&self, device_id: impl Into<DeviceId>, session: Arc<MockSession>) {
        lock(&self.sessions).insert(device_id.into(), session);
    }

    /// Device ids passed to `connect`, in call order.
    pub fn connects(&self) -> Vec<DeviceId> {
        lock(&self.connects).clone()
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(&self, record: &DeviceRecord) -> Result<Arc<dyn DeviceSession>, SessionError> {
        lock(&self.connects).push(record.device_id.clone());
        if !record.has_credential() {
            return Err(SessionError::MissingCredential(record.device_id.clone()));
        }
        let session = lock(&self.sessions).get(&record.device_id).cloned();
        match session {
            Some(session) => {
                session.set_connected(true);
                Ok(session)
            }
            None => Err(SessionError::ConnectFailed {
                device_id: record.device_id.clone(),
                reason: "no such robot".to_string(),
            }),
        }
    }
}
