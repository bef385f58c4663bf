//! Cryptographic primitives for the credential store
//!
//! This module provides:
//! - AES-256-GCM field encryption with a per-field PBKDF2 key
//! - Argon2id master-password verification hashing
//! - Secure memory handling with zeroize

mod cipher;
mod key_derivation;
mod secure_memory;

pub use cipher::{EncryptedField, FieldCipher, MIN_FIELD_LEN, NONCE_LEN, TAG_LEN};
pub use key_derivation::{
    derive_field_key, generate_salt, hash_master_password, HashParams, KdfParams, KEY_LEN,
    SALT_LEN,
};
pub use secure_memory::{DerivedKey, SecretBytes, SecretString};

#[cfg(test)]
pub(crate) use key_derivation::{fast_hash_params, fast_kdf_params};
