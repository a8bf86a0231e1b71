//! Six digit pairing codes.
//!
//! A host receives one code per session.  Codes are drawn uniformly from
//! `100000..=999999` so they never start with a zero and always render as six
//! characters.  Uniqueness among active sessions is enforced by the broker,
//! not here.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest code that can be issued.
pub const MIN_CODE: u32 = 100_000;

/// Largest code that can be issued.
pub const MAX_CODE: u32 = 999_999;

/// Reasons a user-supplied code string is not a well-formed pairing code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
    #[error("pairing code is empty")]
    Empty,
    #[error("pairing code must be exactly 6 digits, got {0:?}")]
    Malformed(String),
}

/// A six digit numeric pairing code.
///
/// Stored as its string form because that is what users type and what the
/// wire carries.  Parsing trims surrounding whitespace but otherwise insists
/// on exactly six ASCII digits; codes such as `"000000"` parse fine but are
/// never issued, so matching them simply fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairingCode(String);

impl PairingCode {
    /// Draws a fresh code uniformly from [`MIN_CODE`]`..=`[`MAX_CODE`].
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.random_range(MIN_CODE..=MAX_CODE).to_string())
    }

    /// Parses a user-supplied code.
    ///
    /// # Errors
    ///
    /// Returns [`CodeError::Empty`] for blank input and
    /// [`CodeError::Malformed`] for anything that is not six digits.
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CodeError::Empty);
        }
        if trimmed.len() != 6 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodeError::Malformed(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
