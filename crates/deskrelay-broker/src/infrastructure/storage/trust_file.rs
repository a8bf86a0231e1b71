//! [`TrustFile`] implementations for the legacy trust table.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::legacy_trust::{LegacyTrustTable, TrustFile};
use crate::application::persistence::StoreError;
use crate::infrastructure::storage::atomic::{read_json, write_json};

/// The table as one JSON object on disk.
pub struct JsonTrustFile {
    path: PathBuf,
}

impl JsonTrustFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TrustFile for JsonTrustFile {
    async fn load(&self) -> Result<LegacyTrustTable, StoreError> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    async fn replace(&self, table: &LegacyTrustTable) -> Result<(), StoreError> {
        write_json(&self.path, table).await
    }
}

/// Keeps the last written table in memory.
#[derive(Default)]
pub struct InMemoryTrustFile {
    table: Mutex<LegacyTrustTable>,
}

impl InMemoryTrustFile {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrustFile for InMemoryTrustFile {
    async fn load(&self) -> Result<LegacyTrustTable, StoreError> {
        Ok(self.table.lock().await.clone())
    }

    async fn replace(&self, table: &LegacyTrustTable) -> Result<(), StoreError> {
        *self.table.lock().await = table.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::legacy_trust::LegacyTrustEntry;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn table() -> LegacyTrustTable {
        let now = Utc::now();
        let entry = LegacyTrustEntry {
            password_hash: "argon2id$00$00".into(),
            created_at: now,
            last_used_at: now,
        };
        BTreeMap::from([(
            "M1".to_string(),
            BTreeMap::from([("client-a".to_string(), entry)]),
        )])
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty_table() {
        let dir = TempDir::new().unwrap();
        let file = JsonTrustFile::new(dir.path().join("trusted_devices.json"));
        assert!(file.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_then_load_round_trips_on_disk() {
        // Arrange
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trusted_devices.json");
        let expected = table();

        // Act
        JsonTrustFile::new(&path).replace(&expected).await.unwrap();
        let loaded = JsonTrustFile::new(&path).load().await.unwrap();

        // Assert
        assert_eq!(loaded, expected);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"lastUsedAt\""));
    }

    #[tokio::test]
    async fn test_in_memory_file_keeps_last_table() {
        let file = InMemoryTrustFile::new();
        file.replace(&table()).await.unwrap();
        assert_eq!(file.load().await.unwrap().len(), 1);
    }
}
