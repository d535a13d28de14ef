//! Snapshot persistence for the in-process store
//!
//! The whole store is written as one JSON document. Writes go to a temporary file
//! that is renamed over the previous snapshot, so a crash mid-write leaves the last
//! good snapshot in place.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use super::memory::MemoryStore;
use super::store::StoreError;
use crate::data::{Alert, Shipment, StoredReading};
use crate::thresholds::SensorThreshold;

const SCHEMA_VERSION: u32 = 1;

/// Serialized form of every relation in the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub shipments: Vec<Shipment>,
    pub thresholds: Vec<SensorThreshold>,
    pub readings: Vec<StoredReading>,
    pub alerts: Vec<Alert>,
    pub next_alert_id: u64,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    schema_version: u32,
    created_at: chrono::DateTime<chrono::Utc>,
    store: StoreSnapshot,
}

/// Write the store to `path`
pub fn write_snapshot(store: &MemoryStore, path: &Path) -> Result<usize, StoreError> {
    let file = SnapshotFile {
        schema_version: SCHEMA_VERSION,
        created_at: chrono::Utc::now(),
        store: store.snapshot(),
    };
    let data = serde_json::to_vec(&file)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &data)?;
    fs::rename(&tmp, path)?;

    Ok(data.len())
}

/// [`write_snapshot`] on the blocking pool, for use from async code
pub async fn persist_snapshot(store: Arc<MemoryStore>, path: PathBuf) -> Result<usize, StoreError> {
    tokio::task::spawn_blocking(move || write_snapshot(&store, &path))
        .await
        .map_err(|e| StoreError::Io(format!("snapshot task failed: {}", e)))?
}

/// Load a store from `path`; a missing file yields an empty store
pub fn load_snapshot(path: &Path) -> Result<MemoryStore, StoreError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No snapshot found, starting empty");
        return Ok(MemoryStore::new());
    }

    let data = fs::read(path)?;
    let file: SnapshotFile = serde_json::from_slice(&data)?;
    if file.schema_version != SCHEMA_VERSION {
        return Err(StoreError::Serialization(format!(
            "unsupported snapshot schema version {}",
            file.schema_version
        )));
    }

    tracing::info!(
        path = %path.display(),
        created_at = %file.created_at,
        readings = file.store.readings.len(),
        alerts = file.store.alerts.len(),
        "Restored store from snapshot"
    );

    Ok(MemoryStore::from_snapshot(file.store))
}

/// Background worker that periodically snapshots the store
pub struct SnapshotWorker {
    store: Arc<MemoryStore>,
    path: PathBuf,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl SnapshotWorker {
    pub fn new(store: Arc<MemoryStore>, path: PathBuf, interval: Duration) -> Self {
        Self {
            store,
            path,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Snapshot worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);
            // First tick completes immediately
            interval.tick().await;

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;
                self.run_once().await;
            }

            tracing::info!("Snapshot worker stopped");
        })
    }

    /// Write one snapshot now, logging failures
    pub async fn run_once(&self) {
        match persist_snapshot(Arc::clone(&self.store), self.path.clone()).await {
            Ok(bytes) => tracing::debug!(path = %self.path.display(), bytes, "Snapshot written"),
            Err(e) => tracing::error!(path = %self.path.display(), error = %e, "Snapshot failed"),
        }
    }

    /// Stop the worker
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
