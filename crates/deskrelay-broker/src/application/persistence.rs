//! Durability policy for credential writes.
//!
//! Every grant (and every `lastUsedAt` update) is first committed in memory
//! and then written to its backing file.  What happens when the write fails is
//! a deployment choice:
//!
//! | level          | failed write reports | in-memory commit |
//! |----------------|----------------------|------------------|
//! | `strict`       | `PersistenceFailure` | kept             |
//! | `best-effort`  | success (logged)     | kept             |
//!
//! Under `best-effort` a crash between the in-memory commit and the next
//! successful write loses the grant.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::application::error::BrokerError;

/// Failure of a backing store read or write.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored JSON could not be parsed or produced.
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// How a failed durable write is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Durability {
    /// The operation fails when its write fails.
    #[default]
    Strict,
    /// The write failure is logged and the operation succeeds.
    BestEffort,
}

impl Durability {
    /// Applies the policy to the outcome of a durable write.
    ///
    /// `what` names the operation for the log line; it must never contain a
    /// password or hash.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Persistence`] under [`Durability::Strict`] when
    /// `result` is an error.
    pub fn settle(self, what: &str, result: Result<(), StoreError>) -> Result<(), BrokerError> {
        match (result, self) {
            (Ok(()), _) => Ok(()),
            (Err(e), Durability::Strict) => {
                error!("{what}: durable write failed: {e}");
                Err(e.into())
            }
            (Err(e), Durability::BestEffort) => {
                error!("{what}: durable write failed, continuing (best-effort): {e}");
                Ok(())
            }
        }
    }
}
