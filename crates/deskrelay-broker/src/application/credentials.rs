//! Credential store: durable, machine-scoped permanent access.
//!
//! A host can grant a controller a labeled password ("permanent access") so
//! the controller can later pair without a code and without the host
//! approving it interactively.
//!
//! # Record shape
//!
//! One [`MachineRecord`] per `machineId` holds any number of
//! [`TrustedCredential`] entries.  An entry is identified by its
//! `(label, ownerClientId)` pair:
//!
//! - a grant with the same label *and* owner replaces that entry's hash (a
//!   password change, after which the old password stops working);
//! - any other grant appends, so one label may cover several devices.
//!
//! [`CredentialStore::revoke`] removes exactly one entry by the same pair, so a
//! controller can only withdraw credentials it owns.
//!
//! # Storage seam
//!
//! Records live behind the [`DocumentStore`] trait (`find_one` / `find` /
//! `save`, unique on `machineId`).  The file-backed implementation is in
//! [`crate::infrastructure::storage::document_store`]; tests use the in-memory
//! one from the same module.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskrelay_core::crypto::{hash_password, verify_password};
use deskrelay_core::protocol::messages::{CredentialSummary, MachineAccess};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::error::BrokerError;
use crate::application::persistence::{Durability, StoreError};

// ── Record types ──────────────────────────────────────────────────────────────

/// One granted credential.  `password_hash` is a salted one-way digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedCredential {
    pub label: String,
    pub password_hash: String,
    pub owner_client_id: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// All credentials granted for one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRecord {
    pub machine_id: String,
    pub display_name: String,
    #[serde(default)]
    pub credentials: Vec<TrustedCredential>,
}

/// Selection criteria for [`DocumentStore::find`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    /// Records holding at least one credential owned by this client.
    CredentialOwner(String),
}

impl RecordFilter {
    pub fn matches(&self, record: &MachineRecord) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::CredentialOwner(owner) => record
                .credentials
                .iter()
                .any(|c| &c.owner_client_id == owner),
        }
    }
}

/// Narrow document-store interface over machine records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Looks up the record for `machine_id`.
    async fn find_one(&self, machine_id: &str) -> Result<Option<MachineRecord>, StoreError>;

    /// Returns every record matching `filter`.
    async fn find(&self, filter: &RecordFilter) -> Result<Vec<MachineRecord>, StoreError>;

    /// Inserts or replaces the record keyed by `record.machine_id`.
    async fn save(&self, record: &MachineRecord) -> Result<(), StoreError>;
}

/// Reasons a credential operation failed.
#[derive(Debug, Error, PartialEq)]
pub enum CredentialError {
    #[error("no permanent access is configured for this machine")]
    NoSuchMachine,

    #[error("invalid label or password")]
    InvalidCredential,

    #[error("no credential with that label is owned by this client")]
    NoSuchCredential,

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl From<CredentialError> for BrokerError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::NoSuchMachine | CredentialError::NoSuchCredential => {
                BrokerError::NotFound(e.to_string())
            }
            CredentialError::InvalidCredential => BrokerError::AuthFailed(e.to_string()),
            CredentialError::Broker(inner) => inner,
        }
    }
}

/// What a successful authentication tells the caller.  Carries no hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCredential {
    pub machine_id: String,
    pub display_name: String,
    pub label: String,
    pub owner_client_id: String,
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Grants, authenticates, revokes and lists permanent-access credentials.
///
/// Every read-modify-write runs under one async lock, so a grant and an
/// authentication for the same machine are linearizable.
pub struct CredentialStore {
    store: Arc<dyn DocumentStore>,
    durability: Durability,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn DocumentStore>, durability: Durability) -> Self {
        Self {
            store,
            durability,
            write_lock: Mutex::new(()),
        }
    }

    /// Grants `password` under `label` for `machine_id` to `owner_client_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Broker`] wrapping a persistence failure when
    /// the record cannot be read, or cannot be written under strict durability.
    pub async fn grant(
        &self,
        machine_id: &str,
        display_name: &str,
        label: &str,
        password: &str,
        owner_client_id: &str,
    ) -> Result<(), CredentialError> {
        let password_hash = hash_password(password).map_err(BrokerError::from)?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();

        let mut record = self
            .store
            .find_one(machine_id)
            .await
            .map_err(BrokerError::from)?
            .unwrap_or_else(|| MachineRecord {
                machine_id: machine_id.to_string(),
                display_name: display_name.to_string(),
                credentials: Vec::new(),
            });
        record.display_name = display_name.to_string();

        match record
            .credentials
            .iter_mut()
            .find(|c| c.label == label && c.owner_client_id == owner_client_id)
        {
            Some(existing) => {
                debug!("replacing credential {label:?} on machine {machine_id}");
                existing.password_hash = password_hash;
            }
            None => record.credentials.push(TrustedCredential {
                label: label.to_string(),
                password_hash,
                owner_client_id: owner_client_id.to_string(),
                created_at: now,
                last_used_at: now,
            }),
        }

        let saved = self.store.save(&record).await;
        self.durability.settle("grant permanent access", saved)?;
        info!(
            "permanent access {label:?} granted on machine {machine_id} ({} credential(s))",
            record.credentials.len()
        );
        Ok(())
    }

    /// Checks `password` against `machine_id`'s entries labeled `label`.
    ///
    /// On success the matching entry's `last_used_at` is updated and saved.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::NoSuchMachine`] when the machine has no record.
    /// - [`CredentialError::InvalidCredential`] when no entry matches.
    /// - [`CredentialError::Broker`] on persistence failure.
    pub async fn authenticate(
        &self,
        machine_id: &str,
        label: &str,
        password: &str,
    ) -> Result<AuthenticatedCredential, CredentialError> {
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .store
            .find_one(machine_id)
            .await
            .map_err(BrokerError::from)?
            .ok_or(CredentialError::NoSuchMachine)?;

        let entry = record
            .credentials
            .iter_mut()
            .find(|c| c.label == label && verify_password(password, &c.password_hash))
            .ok_or(CredentialError::InvalidCredential)?;
        entry.last_used_at = Utc::now();
        let authenticated = AuthenticatedCredential {
            machine_id: record.machine_id.clone(),
            display_name: record.display_name.clone(),
            label: entry.label.clone(),
            owner_client_id: entry.owner_client_id.clone(),
        };

        let saved = self.store.save(&record).await;
        self.durability.settle("record credential use", saved)?;
        Ok(authenticated)
    }

    /// Removes the entry labeled `label` and owned by `owner_client_id` from
    /// `machine_id`'s record.  Other owners' entries under the same label are
    /// untouched.  The record itself is kept even when it becomes empty.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::NoSuchMachine`] when the machine has no record.
    /// - [`CredentialError::NoSuchCredential`] when no entry has that label and owner.
    /// - [`CredentialError::Broker`] on persistence failure (strict durability).
    pub async fn revoke(
        &self,
        machine_id: &str,
        label: &str,
        owner_client_id: &str,
    ) -> Result<(), CredentialError> {
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .store
            .find_one(machine_id)
            .await
            .map_err(BrokerError::from)?
            .ok_or(CredentialError::NoSuchMachine)?;

        let position = record
            .credentials
            .iter()
            .position(|c| c.label == label && c.owner_client_id == owner_client_id)
            .ok_or(CredentialError::NoSuchCredential)?;
        record.credentials.remove(position);

        let saved = self.store.save(&record).await;
        self.durability.settle("revoke permanent access", saved)?;
        info!(
            "permanent access {label:?} revoked on machine {machine_id} ({} credential(s) left)",
            record.credentials.len()
        );
        Ok(())
    }

    /// Lists the machines `client_id` holds credentials for, each filtered to
    /// that client's own entries.  Hashes are never included.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Broker`] when the store cannot be read.
    pub async fn list_for_client(&self, client_id: &str) -> Result<Vec<MachineAccess>, CredentialError> {
        let records = self
            .store
            .find(&RecordFilter::CredentialOwner(client_id.to_string()))
            .await
            .map_err(BrokerError::from)?;

        let mut machines: Vec<MachineAccess> = records
            .into_iter()
            .map(|record| MachineAccess {
                machine_id: record.machine_id,
                display_name: record.display_name,
                credentials: record
                    .credentials
                    .into_iter()
                    .filter(|c| c.owner_client_id == client_id)
                    .map(|c| CredentialSummary {
                        label: c.label,
                        owner_client_id: c.owner_client_id,
                        created_at: c.created_at.timestamp_millis(),
                        last_used_at: c.last_used_at.timestamp_millis(),
                    })
                    .collect(),
            })
            .filter(|machine| !machine.credentials.is_empty())
            .collect();
        machines.sort_by(|a, b| a.machine_id.cmp(&b.machine_id));
        Ok(machines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::document_store::InMemoryDocumentStore;

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(InMemoryDocumentStore::new()), Durability::Strict)
    }

    // ── Test double ───────────────────────────────────────────────────────────

    /// Reads succeed (empty), writes always fail.
    struct ReadOnlyStore;

    #[async_trait]
    impl DocumentStore for ReadOnlyStore {
        async fn find_one(&self, _machine_id: &str) -> Result<Option<MachineRecord>, StoreError> {
            Ok(None)
        }

        async fn find(&self, _filter: &RecordFilter) -> Result<Vec<MachineRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn save(&self, _record: &MachineRecord) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("store is read-only".to_string()))
        }
    }

    /// Holds one seeded record; every write fails.
    struct SeededReadOnlyStore(MachineRecord);

    #[async_trait]
    impl DocumentStore for SeededReadOnlyStore {
        async fn find_one(&self, machine_id: &str) -> Result<Option<MachineRecord>, StoreError> {
            Ok((self.0.machine_id == machine_id).then(|| self.0.clone()))
        }

        async fn find(&self, _filter: &RecordFilter) -> Result<Vec<MachineRecord>, StoreError> {
            Ok(vec![self.0.clone()])
        }

        async fn save(&self, _record: &MachineRecord) -> Result<(), StoreError> {
            Err(StoreError::Corrupt("store is read-only".to_string()))
        }
    }

    // ── grant / authenticate ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_grant_then_authenticate_succeeds() {
        // Arrange
        let creds = store();
        creds.grant("M1", "Studio", "laptop", "pw-1", "owner-a").await.unwrap();

        // Act
        let auth = creds.authenticate("M1", "laptop", "pw-1").await.unwrap();

        // Assert
        assert_eq!(auth.machine_id, "M1");
        assert_eq!(auth.display_name, "Studio");
        assert_eq!(auth.owner_client_id, "owner-a");
    }

    #[tokio::test]
    async fn test_unknown_machine_is_distinguished_from_wrong_password() {
        let creds = store();
        creds.grant("M1", "Studio", "laptop", "pw-1", "owner-a").await.unwrap();

        assert_eq!(
            creds.authenticate("M2", "laptop", "pw-1").await,
            Err(CredentialError::NoSuchMachine)
        );
        assert_eq!(
            creds.authenticate("M1", "laptop", "wrong").await,
            Err(CredentialError::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn test_label_must_match_too() {
        let creds = store();
        creds.grant("M1", "Studio", "laptop", "pw-1", "owner-a").await.unwrap();
        assert_eq!(
            creds.authenticate("M1", "tablet", "pw-1").await,
            Err(CredentialError::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn test_password_change_invalidates_old_password() {
        // Arrange
        let creds = store();
        creds.grant("M1", "Studio", "laptop", "old", "owner-a").await.unwrap();

        // Act
        creds.grant("M1", "Studio", "laptop", "new", "owner-a").await.unwrap();

        // Assert
        assert!(creds.authenticate("M1", "laptop", "new").await.is_ok());
        assert_eq!(
            creds.authenticate("M1", "laptop", "old").await,
            Err(CredentialError::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn test_same_label_for_different_owners_accumulates() {
        let creds = store();
        creds.grant("M1", "Studio", "family", "pw-a", "owner-a").await.unwrap();
        creds.grant("M1", "Studio", "family", "pw-b", "owner-b").await.unwrap();

        assert!(creds.authenticate("M1", "family", "pw-a").await.is_ok());
        assert!(creds.authenticate("M1", "family", "pw-b").await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_updates_last_used_at() {
        // Arrange
        let backing = Arc::new(InMemoryDocumentStore::new());
        let creds = CredentialStore::new(backing.clone(), Durability::Strict);
        creds.grant("M1", "Studio", "laptop", "pw", "owner-a").await.unwrap();
        let before = backing.find_one("M1").await.unwrap().unwrap().credentials[0].last_used_at;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        // Act
        creds.authenticate("M1", "laptop", "pw").await.unwrap();

        // Assert
        let after = backing.find_one("M1").await.unwrap().unwrap().credentials[0].last_used_at;
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_stored_record_never_holds_plaintext() {
        let backing = Arc::new(InMemoryDocumentStore::new());
        let creds = CredentialStore::new(backing.clone(), Durability::Strict);
        creds.grant("M1", "Studio", "laptop", "plain-secret", "owner-a").await.unwrap();

        let record = backing.find_one("M1").await.unwrap().unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("plain-secret"));
    }

    // ── durability ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_strict_grant_reports_persistence_failure() {
        let creds = CredentialStore::new(Arc::new(ReadOnlyStore), Durability::Strict);
        let result = creds.grant("M1", "Studio", "laptop", "pw", "owner-a").await;
        assert!(matches!(
            result,
            Err(CredentialError::Broker(BrokerError::Persistence(_)))
        ));
    }

    #[tokio::test]
    async fn test_best_effort_grant_succeeds_despite_failed_write() {
        let creds = CredentialStore::new(Arc::new(ReadOnlyStore), Durability::BestEffort);
        assert!(creds.grant("M1", "Studio", "laptop", "pw", "owner-a").await.is_ok());
    }

    // ── revoke ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_revoked_credential_no_longer_authenticates() {
        // Arrange
        let creds = store();
        creds.grant("M1", "Studio", "laptop", "pw", "owner-a").await.unwrap();

        // Act
        creds.revoke("M1", "laptop", "owner-a").await.unwrap();

        // Assert
        assert_eq!(
            creds.authenticate("M1", "laptop", "pw").await,
            Err(CredentialError::InvalidCredential)
        );
        assert!(creds.list_for_client("owner-a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoking_another_owners_entry_is_not_found() {
        // Arrange
        let creds = store();
        creds.grant("M1", "Studio", "family", "pw-a", "owner-a").await.unwrap();

        // Act
        let result = creds.revoke("M1", "family", "owner-b").await;

        // Assert
        assert_eq!(result, Err(CredentialError::NoSuchCredential));
        assert!(matches!(
            BrokerError::from(CredentialError::NoSuchCredential),
            BrokerError::NotFound(_)
        ));
        assert!(creds.authenticate("M1", "family", "pw-a").await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_leaves_other_owners_under_same_label() {
        let creds = store();
        creds.grant("M1", "Studio", "family", "pw-a", "owner-a").await.unwrap();
        creds.grant("M1", "Studio", "family", "pw-b", "owner-b").await.unwrap();

        creds.revoke("M1", "family", "owner-a").await.unwrap();

        assert!(creds.authenticate("M1", "family", "pw-a").await.is_err());
        assert!(creds.authenticate("M1", "family", "pw-b").await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_on_unknown_machine_is_no_such_machine() {
        let creds = store();
        assert_eq!(
            creds.revoke("M9", "laptop", "owner-a").await,
            Err(CredentialError::NoSuchMachine)
        );
    }

    #[tokio::test]
    async fn test_strict_revoke_reports_persistence_failure() {
        // Arrange
        let now = Utc::now();
        let seeded = MachineRecord {
            machine_id: "M1".to_string(),
            display_name: "Studio".to_string(),
            credentials: vec![TrustedCredential {
                label: "laptop".to_string(),
                password_hash: "argon2id$00$00".to_string(),
                owner_client_id: "owner-a".to_string(),
                created_at: now,
                last_used_at: now,
            }],
        };
        let creds = CredentialStore::new(Arc::new(SeededReadOnlyStore(seeded)), Durability::Strict);

        // Act
        let result = creds.revoke("M1", "laptop", "owner-a").await;

        // Assert
        assert!(matches!(
            result,
            Err(CredentialError::Broker(BrokerError::Persistence(_)))
        ));
    }

    // ── list_for_client ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_list_for_client_filters_to_own_entries() {
        // Arrange
        let creds = store();
        creds.grant("M1", "Studio", "laptop", "pw", "owner-a").await.unwrap();
        creds.grant("M1", "Studio", "phone", "pw", "owner-b").await.unwrap();
        creds.grant("M2", "Office", "laptop", "pw", "owner-a").await.unwrap();
        creds.grant("M3", "Lab", "desk", "pw", "owner-b").await.unwrap();

        // Act
        let listed = creds.list_for_client("owner-a").await.unwrap();

        // Assert
        let machines: Vec<&str> = listed.iter().map(|m| m.machine_id.as_str()).collect();
        assert_eq!(machines, ["M1", "M2"]);
        assert!(listed
            .iter()
            .flat_map(|m| &m.credentials)
            .all(|c| c.owner_client_id == "owner-a"));
        assert_eq!(listed[0].credentials.len(), 1);
    }

    #[tokio::test]
    async fn test_list_for_unknown_client_is_empty() {
        let creds = store();
        creds.grant("M1", "Studio", "laptop", "pw", "owner-a").await.unwrap();
        assert!(creds.list_for_client("nobody").await.unwrap().is_empty());
    }

    #[test]
    fn test_credential_error_maps_into_taxonomy() {
        assert!(matches!(
            BrokerError::from(CredentialError::NoSuchMachine),
            BrokerError::NotFound(_)
        ));
        assert!(matches!(
            BrokerError::from(CredentialError::InvalidCredential),
            BrokerError::AuthFailed(_)
        ));
    }
}
