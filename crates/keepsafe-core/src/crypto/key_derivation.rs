//! Password-based key derivation
//!
//! Two derivations share the same 32-byte output length:
//! - Argon2id for the master-password verification hash
//! - PBKDF2-HMAC-SHA256 for the per-field encryption key

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use super::DerivedKey;
use crate::error::{Result, VaultError};

/// Length of every salt written by this crate
pub const SALT_LEN: usize = 32;

/// Length of every derived hash or key
pub const KEY_LEN: usize = 32;

/// Parameters for the PBKDF2 field-key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// PBKDF2 rounds (default: 100 000)
    pub iterations: u32,
}

impl KdfParams {
    /// Lowest iteration count considered acceptable outside of tests
    pub const MIN_ITERATIONS: u32 = 100_000;

    pub fn is_weak(&self) -> bool {
        self.iterations < Self::MIN_ITERATIONS
    }

    /// Refuse parameters with fewer than `floor` iterations
    pub fn ensure_at_least(&self, floor: u32) -> Result<()> {
        if self.iterations < floor {
            return Err(VaultError::KeyDerivation(format!(
                "{} PBKDF2 iterations is below the minimum of {}",
                self.iterations, floor
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: Self::MIN_ITERATIONS,
        }
    }
}

/// Parameters for the Argon2id master-password hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashParams {
    /// Memory cost in KiB (default: 65536 = 64MB)
    pub memory_cost: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive the AES-256 key for one encrypted field
///
/// # Arguments
/// * `secret` - The active master-password material
/// * `salt` - The per-field salt stored in front of the ciphertext
/// * `params` - PBKDF2 parameters
pub fn derive_field_key(secret: &[u8], salt: &[u8], params: &KdfParams) -> DerivedKey {
    let mut key_bytes = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, params.iterations, &mut key_bytes);
    let key = DerivedKey::new(key_bytes);
    key_bytes.zeroize();
    key
}

/// Compute the master-password verification hash using Argon2id
///
/// # Returns
/// A 32-byte hash; only its comparison with the stored hash is meaningful
pub fn hash_master_password(
    password: &str,
    salt: &[u8],
    params: &HashParams,
) -> Result<[u8; KEY_LEN]> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut hash = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut hash)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    Ok(hash)
}

#[cfg(test)]
pub(crate) fn fast_hash_params() -> HashParams {
    HashParams {
        memory_cost: 8192, // 8 MB (faster for testing)
        time_cost: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
pub(crate) fn fast_kdf_params() -> KdfParams {
    KdfParams { iterations: 1_000 }
}
