//! Assembles a [`Broker`] from configuration.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::application::broker::Broker;
use crate::application::credentials::CredentialStore;
use crate::application::legacy_trust::{LegacyTrustStore, LegacyTrustTable};
use crate::application::persistence::Durability;
use crate::application::session_codes::{CodeSource, SessionCodeBroker};
use crate::infrastructure::storage::config::BrokerConfig;
use crate::infrastructure::storage::document_store::{InMemoryDocumentStore, JsonFileDocumentStore};
use crate::infrastructure::storage::trust_file::{InMemoryTrustFile, JsonTrustFile};

/// Opens both durable stores under `config.storage` and builds the broker.
///
/// # Errors
///
/// Fails when either store file exists but cannot be read or parsed.
pub async fn build_broker(config: &BrokerConfig) -> anyhow::Result<Arc<Broker>> {
    let storage = &config.storage;

    let credentials_path = storage.credentials_path();
    let documents = JsonFileDocumentStore::open(&credentials_path)
        .await
        .with_context(|| format!("opening credential store {}", credentials_path.display()))?;

    let legacy_path = storage.legacy_trust_path();
    let legacy = LegacyTrustStore::open(Arc::new(JsonTrustFile::new(&legacy_path)), storage.durability)
        .await
        .with_context(|| format!("opening legacy trust table {}", legacy_path.display()))?;

    info!(
        "broker storage ready in {} ({:?} durability)",
        storage.data_dir.display(),
        storage.durability
    );
    Ok(Arc::new(Broker::new(
        SessionCodeBroker::default(),
        CredentialStore::new(Arc::new(documents), storage.durability),
        legacy,
    )))
}

/// A broker with random codes and no files.
pub async fn in_memory_broker() -> Broker {
    in_memory_broker_with(SessionCodeBroker::default())
}

/// A broker with no files and the given code table, e.g. one built from a
/// [`FixedCodeSource`](crate::application::session_codes::FixedCodeSource).
pub fn in_memory_broker_with(sessions: SessionCodeBroker) -> Broker {
    Broker::new(
        sessions,
        CredentialStore::new(Arc::new(InMemoryDocumentStore::new()), Durability::Strict),
        LegacyTrustStore::with_table(
            Arc::new(InMemoryTrustFile::new()),
            Durability::Strict,
            LegacyTrustTable::new(),
        ),
    )
}

/// Shorthand for [`in_memory_broker_with`] over a code source.
pub fn in_memory_broker_from(codes: Box<dyn CodeSource>) -> Broker {
    in_memory_broker_with(SessionCodeBroker::new(codes))
}
