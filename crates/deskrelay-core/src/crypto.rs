//! Salted one-way digests for access passwords.
//!
//! Stored form: `argon2id$<salt-hex>$<hash-hex>`, an Argon2id (v0x13) output
//! over a fresh 16 byte salt.  Every grant gets its own salt, so two entries
//! holding the same password still store different strings; verification
//! therefore recomputes per entry instead of comparing stored strings.
//!
//! # Cost parameters (for beginners)
//!
//! Argon2id is deliberately slow and memory-hungry so that a leaked store
//! cannot be brute-forced cheaply.  The parameters below (19 MiB, 2 passes,
//! 1 lane) are the common minimum recommendation for interactive logins.
//! They are fixed in code: changing them makes every existing stored hash
//! stop verifying, so a change needs a new scheme tag.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Scheme tag at the front of every stored hash.
pub const SCHEME: &str = "argon2id";

/// Salt length in bytes.
pub const SALT_SIZE: usize = 16;

/// Hash output length in bytes.
pub const HASH_SIZE: usize = 32;

const MEMORY_KIB: u32 = 19 * 1024;
const PASSES: u32 = 2;
const LANES: u32 = 1;

/// Hashing could not run (invalid parameters or input too long).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("password hashing failed: {0}")]
pub struct CryptoError(String);

/// Hashes `password` with a fresh random salt.
///
/// # Errors
///
/// Returns [`CryptoError`] when Argon2 rejects its input.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_SIZE];
    rand::rng().fill_bytes(&mut salt);
    let hash = argon2id(password, &salt)?;
    Ok(format!("{SCHEME}${}${}", hex::encode(salt), hex::encode(hash)))
}

/// Returns `true` when `password` produces `stored`.
///
/// Malformed stored values never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(scheme), Some(salt_hex), Some(hash_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != SCHEME {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
        return false;
    };
    if salt.len() != SALT_SIZE || expected.len() != HASH_SIZE {
        return false;
    }
    match argon2id(password, &salt) {
        Ok(computed) => computed.as_slice().ct_eq(expected.as_slice()).into(),
        Err(_) => false,
    }
}

fn argon2id(password: &str, salt: &[u8]) -> Result<[u8; HASH_SIZE], CryptoError> {
    let params = Params::new(MEMORY_KIB, PASSES, LANES, Some(HASH_SIZE))
        .map_err(|e| CryptoError(e.to_string()))?;
    let mut output = [0u8; HASH_SIZE];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut output)
        .map_err(|e| CryptoError(e.to_string()))?;
    Ok(output)
}
