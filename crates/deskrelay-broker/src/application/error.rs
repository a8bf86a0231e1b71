//! Error taxonomy shared by every broker handler.
//!
//! Handlers return `Result<_, BrokerError>`; the dispatch boundary
//! ([`crate::application::dispatch`]) turns each error into the reply the
//! originating connection expects.  No error ever closes a connection.

use deskrelay_core::crypto::CryptoError;
use deskrelay_core::ConnectionId;
use thiserror::Error;

use crate::application::persistence::StoreError;

/// Failure of a single inbound request.
#[derive(Debug, Error, PartialEq)]
pub enum BrokerError {
    /// A required field is missing or the sender's role forbids the request.
    #[error("{0}")]
    Validation(String),

    /// The code, host, machine or credential named by the request is absent.
    #[error("{0}")]
    NotFound(String),

    /// A password did not verify.
    #[error("{0}")]
    AuthFailed(String),

    /// A relay target is not a live connection.  Logged and dropped.
    #[error("recipient {0} is not connected")]
    RecipientUnavailable(ConnectionId),

    /// A relay between two connections the host never paired.  Logged and
    /// dropped.
    #[error("{from} is not paired with {to}")]
    NotPaired { from: ConnectionId, to: ConnectionId },

    /// A durable write failed under strict durability.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A password could not be hashed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Every sampled pairing code was already held by another host.
    #[error("no unused pairing code found after {0} attempts")]
    CodesExhausted(u32),
}

impl BrokerError {
    /// Shorthand for [`BrokerError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        BrokerError::Validation(message.into())
    }

    /// Shorthand for [`BrokerError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        BrokerError::NotFound(message.into())
    }
}

impl From<StoreError> for BrokerError {
    fn from(e: StoreError) -> Self {
        BrokerError::Persistence(e.to_string())
    }
}
