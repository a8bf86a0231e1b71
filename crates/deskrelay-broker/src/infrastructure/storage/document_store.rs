//! [`DocumentStore`] implementations for machine records.
//!
//! - [`JsonFileDocumentStore`] keeps every record in memory and rewrites one
//!   JSON file (an array of records) after each save.
//! - [`InMemoryDocumentStore`] never touches the disk; used by tests and by
//!   deployments that do not want durable permanent access.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::credentials::{DocumentStore, MachineRecord, RecordFilter};
use crate::application::persistence::StoreError;
use crate::infrastructure::storage::atomic::{read_json, write_json};

type Records = BTreeMap<String, MachineRecord>;

fn select(records: &Records, filter: &RecordFilter) -> Vec<MachineRecord> {
    records
        .values()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect()
}

// ── File-backed ───────────────────────────────────────────────────────────────

/// Machine records persisted as one JSON file.
pub struct JsonFileDocumentStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonFileDocumentStore {
    /// Opens the store at `path`, loading existing records.  A missing file is
    /// an empty store; the file is created on the first save.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the file exists but cannot be read or
    /// parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let loaded: Vec<MachineRecord> = read_json(&path).await?.unwrap_or_default();
        let records: Records = loaded
            .into_iter()
            .map(|r| (r.machine_id.clone(), r))
            .collect();
        info!(
            "credential store {} opened ({} machine(s))",
            path.display(),
            records.len()
        );
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentStore for JsonFileDocumentStore {
    async fn find_one(&self, machine_id: &str) -> Result<Option<MachineRecord>, StoreError> {
        Ok(self.records.lock().await.get(machine_id).cloned())
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<MachineRecord>, StoreError> {
        Ok(select(&*self.records.lock().await, filter))
    }

    /// The record is kept in memory even when the file write fails.
    async fn save(&self, record: &MachineRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.insert(record.machine_id.clone(), record.clone());
        let snapshot: Vec<&MachineRecord> = records.values().collect();
        write_json(&self.path, &snapshot).await?;
        debug!("credential store {} written", self.path.display());
        Ok(())
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryDocumentStore {
    records: Mutex<Records>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(&self, machine_id: &str) -> Result<Option<MachineRecord>, StoreError> {
        Ok(self.records.lock().await.get(machine_id).cloned())
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<MachineRecord>, StoreError> {
        Ok(select(&*self.records.lock().await, filter))
    }

    async fn save(&self, record: &MachineRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(record.machine_id.clone(), record.clone());
        Ok(())
    }
}
