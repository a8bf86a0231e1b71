//! Legacy trust table for the older password-only pairing protocol.
//!
//! Older hosts grant access by attaching `setPassword` to an approving
//! `connection-response`; older controllers come back with
//! `connect-with-password {machineId, password}`.  The table is kept apart
//! from the [`CredentialStore`](crate::application::credentials::CredentialStore)
//! and has its own file:
//!
//! ```json
//! {
//!   "M1": {
//!     "6f1c2d4e-…": { "passwordHash": "argon2id$…", "createdAt": "…", "lastUsedAt": "…" }
//!   }
//! }
//! ```
//!
//! The whole table is loaded at start-up and rewritten on every change.
//!
//! Authentication failures are deliberately indistinct: an unknown machine
//! and a wrong password produce the same [`BrokerError::AuthFailed`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskrelay_core::crypto::{hash_password, verify_password};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::application::error::BrokerError;
use crate::application::persistence::{Durability, StoreError};

/// Message returned for every failed legacy authentication.
pub const LEGACY_AUTH_FAILED: &str = "invalid machine or password";

/// One legacy grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTrustEntry {
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// `machineId → clientId → entry`.
pub type LegacyTrustTable = BTreeMap<String, BTreeMap<String, LegacyTrustEntry>>;

/// Atomic load/replace of the whole table.
#[async_trait]
pub trait TrustFile: Send + Sync {
    /// Reads the table; a missing file is an empty table.
    async fn load(&self) -> Result<LegacyTrustTable, StoreError>;

    /// Replaces the stored table with `table`.
    async fn replace(&self, table: &LegacyTrustTable) -> Result<(), StoreError>;
}

pub struct LegacyTrustStore {
    file: Arc<dyn TrustFile>,
    durability: Durability,
    table: Mutex<LegacyTrustTable>,
}

impl LegacyTrustStore {
    /// Loads the table from `file`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the file exists but cannot be read or
    /// parsed.
    pub async fn open(file: Arc<dyn TrustFile>, durability: Durability) -> Result<Self, StoreError> {
        let table = file.load().await?;
        info!("legacy trust table loaded ({} machine(s))", table.len());
        Ok(Self::with_table(file, durability, table))
    }

    /// Builds a store around an already loaded table.
    pub fn with_table(file: Arc<dyn TrustFile>, durability: Durability, table: LegacyTrustTable) -> Self {
        Self {
            file,
            durability,
            table: Mutex::new(table),
        }
    }

    /// Grants `client_id` access to `machine_id` with `password`, replacing
    /// any earlier grant for the same pair.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Persistence`] when the rewrite fails under
    /// strict durability.
    pub async fn grant_legacy(
        &self,
        machine_id: &str,
        client_id: &str,
        password: &str,
    ) -> Result<(), BrokerError> {
        let password_hash = hash_password(password)?;
        let mut table = self.table.lock().await;
        let now = Utc::now();
        let clients = table.entry(machine_id.to_string()).or_default();
        let created_at = clients
            .get(client_id)
            .map_or(now, |existing| existing.created_at);
        clients.insert(
            client_id.to_string(),
            LegacyTrustEntry {
                password_hash,
                created_at,
                last_used_at: now,
            },
        );

        let written = self.file.replace(&table).await;
        self.durability.settle("grant legacy trust", written)?;
        info!("legacy trust granted on machine {machine_id}");
        Ok(())
    }

    /// Checks `password` against every client entry for `machine_id`.
    ///
    /// Returns the client id whose entry matched.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::AuthFailed`] for an unknown machine and for a
    /// wrong password alike, and [`BrokerError::Persistence`] when the
    /// `lastUsedAt` rewrite fails under strict durability.
    pub async fn authenticate_legacy(
        &self,
        machine_id: &str,
        password: &str,
    ) -> Result<String, BrokerError> {
        let mut table = self.table.lock().await;
        let failed = || BrokerError::AuthFailed(LEGACY_AUTH_FAILED.to_string());

        let (client_id, entry) = table
            .get_mut(machine_id)
            .ok_or_else(failed)?
            .iter_mut()
            .find(|(_, entry)| verify_password(password, &entry.password_hash))
            .ok_or_else(failed)?;
        entry.last_used_at = Utc::now();
        let client_id = client_id.clone();

        let written = self.file.replace(&table).await;
        self.durability.settle("record legacy trust use", written)?;
        Ok(client_id)
    }

    /// Number of machines with at least one legacy grant.
    pub async fn machine_count(&self) -> usize {
        self.table.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Records every replaced table; optionally fails writes.
    #[derive(Default)]
    struct RecordingTrustFile {
        initial: LegacyTrustTable,
        writes: StdMutex<Vec<LegacyTrustTable>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl TrustFile for RecordingTrustFile {
        async fn load(&self) -> Result<LegacyTrustTable, StoreError> {
            Ok(self.initial.clone())
        }

        async fn replace(&self, table: &LegacyTrustTable) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Corrupt("disk full".to_string()));
            }
            self.writes.lock().unwrap().push(table.clone());
            Ok(())
        }
    }

    async fn open(file: Arc<RecordingTrustFile>, durability: Durability) -> LegacyTrustStore {
        LegacyTrustStore::open(file, durability).await.unwrap()
    }

    #[tokio::test]
    async fn test_grant_then_authenticate_returns_client() {
        // Arrange
        let store = open(Arc::new(RecordingTrustFile::default()), Durability::Strict).await;
        store.grant_legacy("M1", "client-a", "pw").await.unwrap();

        // Act
        let client = store.authenticate_legacy("M1", "pw").await;

        // Assert
        assert_eq!(client, Ok("client-a".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_machine_and_wrong_password_look_the_same() {
        let store = open(Arc::new(RecordingTrustFile::default()), Durability::Strict).await;
        store.grant_legacy("M1", "client-a", "pw").await.unwrap();

        let unknown = store.authenticate_legacy("M9", "pw").await.unwrap_err();
        let wrong = store.authenticate_legacy("M1", "nope").await.unwrap_err();

        assert_eq!(unknown, wrong);
        assert_eq!(unknown, BrokerError::AuthFailed(LEGACY_AUTH_FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_every_grant_rewrites_whole_table() {
        // Arrange
        let file = Arc::new(RecordingTrustFile::default());
        let store = open(file.clone(), Durability::Strict).await;

        // Act
        store.grant_legacy("M1", "client-a", "pw").await.unwrap();
        store.grant_legacy("M2", "client-b", "pw").await.unwrap();

        // Assert
        let writes = file.writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].len(), 2, "second write must contain both machines");
    }

    #[tokio::test]
    async fn test_regrant_replaces_password() {
        let store = open(Arc::new(RecordingTrustFile::default()), Durability::Strict).await;
        store.grant_legacy("M1", "client-a", "old").await.unwrap();
        store.grant_legacy("M1", "client-a", "new").await.unwrap();

        assert!(store.authenticate_legacy("M1", "old").await.is_err());
        assert!(store.authenticate_legacy("M1", "new").await.is_ok());
    }

    #[tokio::test]
    async fn test_open_uses_existing_table() {
        // Arrange: a table written by an earlier run
        let now = Utc::now();
        let mut initial = LegacyTrustTable::new();
        initial.entry("M1".to_string()).or_default().insert(
            "client-a".to_string(),
            LegacyTrustEntry {
                password_hash: hash_password("pw").unwrap(),
                created_at: now,
                last_used_at: now,
            },
        );
        let file = Arc::new(RecordingTrustFile {
            initial,
            ..Default::default()
        });

        // Act
        let store = open(file, Durability::Strict).await;

        // Assert
        assert_eq!(store.machine_count().await, 1);
        assert!(store.authenticate_legacy("M1", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_write_respects_durability() {
        let failing = || {
            Arc::new(RecordingTrustFile {
                fail_writes: true,
                ..Default::default()
            })
        };

        let strict = open(failing(), Durability::Strict).await;
        assert!(matches!(
            strict.grant_legacy("M1", "c", "pw").await,
            Err(BrokerError::Persistence(_))
        ));

        let lenient = open(failing(), Durability::BestEffort).await;
        assert!(lenient.grant_legacy("M1", "c", "pw").await.is_ok());
        assert!(lenient.authenticate_legacy("M1", "pw").await.is_ok());
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let now = Utc::now();
        let entry = LegacyTrustEntry {
            password_hash: "argon2id$00$00".to_string(),
            created_at: now,
            last_used_at: now,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("passwordHash").is_some());
        assert!(json.get("lastUsedAt").is_some());
    }
}
