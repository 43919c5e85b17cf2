//! Persisted device registry.
//!
//! The last-known [`DeviceRecord`] of every robot, credential included, keyed
//! by device id.  Stored as pretty-printed JSON so the raw capability
//! descriptor survives unchanged:
//!
//! ```json
//! {
//!   "3145C60822630830": {
//!     "ip": "192.168.1.40",
//!     "hostname": "Roomba-3145C60822630830",
//!     "robot_name": "Downstairs",
//!     ...
//!     "credential": ":1:1486937829:gAcFexrLxpQwUsIV"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use roomba_core::{DeviceId, DeviceRecord};
use thiserror::Error;
use tracing::debug;

/// Error type for registry persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error accessing device registry at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("device registry at {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads and saves the set of known robots.
pub trait DeviceStore: Send + Sync {
    /// Returns every stored record.  An absent store yields an empty list.
    fn load(&self) -> Result<Vec<DeviceRecord>, StoreError>;

    /// Replaces the stored set with `records`.
    fn save(&self, records: &[DeviceRecord]) -> Result<(), StoreError>;
}

/// [`DeviceStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl DeviceStore for JsonFileStore {
    fn load(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        let map: BTreeMap<DeviceId, DeviceRecord> =
            serde_json::from_str(&content).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        debug!("loaded {} device(s) from {}", map.len(), self.path.display());
        Ok(map.into_values().collect())
    }

    fn save(&self, records: &[DeviceRecord]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let map: BTreeMap<&str, &DeviceRecord> = records
            .iter()
            .map(|r| (r.device_id.as_str(), r))
            .collect();
        let content = serde_json::to_string_pretty(&map).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, content).map_err(|e| self.io_error(e))?;
        debug!("saved {} device(s) to {}", map.len(), self.path.display());
        Ok(())
    }
}

/// [`DeviceStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<DeviceRecord>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<DeviceRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<DeviceRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DeviceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceStore for MemoryStore {
    fn load(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        Ok(self.records())
    }

    fn save(&self, records: &[DeviceRecord]) -> Result<(), StoreError> {
        *self.lock() = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
