//! AES-256-GCM field encryption keyed from the master password
//!
//! Encrypted field format: `{kdf_salt}{nonce}{ciphertext}{auth_tag}`
//! - KDF salt: 32 bytes, fresh per call
//! - Nonce: 12 bytes (96 bits) - standard for GCM
//! - Ciphertext: variable length
//! - Auth tag: 16 bytes (128 bits)
//!
//! Everything after the salt is the authenticated token.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use super::key_derivation::{derive_field_key, generate_salt, KdfParams, SALT_LEN};
use super::{SecretBytes, SecretString};
use crate::error::{DecryptionFailure, Result, VaultError};

/// GCM nonce length
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length
pub const TAG_LEN: usize = 16;

/// Smallest well-formed encrypted field (empty plaintext)
pub const MIN_FIELD_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Encrypted field split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    /// Salt fed to the field-key derivation
    pub kdf_salt: [u8; SALT_LEN],
    /// Nonce for GCM
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the auth tag appended (as produced by aes-gcm)
    pub sealed: Vec<u8>,
}

impl EncryptedField {
    /// Parse the stored byte layout
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, DecryptionFailure> {
        if bytes.len() < MIN_FIELD_LEN {
            return Err(DecryptionFailure::Truncated);
        }

        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        let mut kdf_salt = [0u8; SALT_LEN];
        kdf_salt.copy_from_slice(salt);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce);

        Ok(Self {
            kdf_salt,
            nonce: nonce_bytes,
            sealed: sealed.to_vec(),
        })
    }

    /// Serialize to the stored byte layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + self.sealed.len());
        out.extend_from_slice(&self.kdf_salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sealed);
        out
    }
}

/// Symmetric cipher derived from the active master password
///
/// Holds the password material itself rather than one key: every call
/// derives a fresh key under a fresh salt.
pub struct FieldCipher {
    secret: SecretBytes,
    params: KdfParams,
}

impl FieldCipher {
    /// Create a cipher from the master password
    pub fn new(password: &str, params: KdfParams) -> Self {
        Self {
            secret: SecretBytes::from_text(password),
            params,
        }
    }

    /// Encrypt plaintext bytes into the stored layout
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let kdf_salt = generate_salt();
        let key = derive_field_key(self.secret.expose(), &kdf_salt, &self.params);

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        // Generate random nonce (12 bytes for GCM)
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        // aes-gcm appends the auth tag to the ciphertext
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        Ok(EncryptedField {
            kdf_salt,
            nonce,
            sealed,
        }
        .to_bytes())
    }

    /// Decrypt the stored layout back into plaintext bytes
    ///
    /// Never panics on hostile input: every failure becomes a
    /// [`DecryptionFailure`].
    pub fn open(&self, data: &[u8]) -> std::result::Result<SecretBytes, DecryptionFailure> {
        let field = EncryptedField::from_bytes(data)?;
        let key = derive_field_key(self.secret.expose(), &field.kdf_salt, &self.params);

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| DecryptionFailure::Authentication)?;

        cipher
            .decrypt(Nonce::from_slice(&field.nonce), field.sealed.as_slice())
            .map(SecretBytes::new)
            .map_err(|_| DecryptionFailure::Authentication)
    }

    /// Encrypt a string field
    pub fn seal_str(&self, plaintext: &str) -> Result<Vec<u8>> {
        self.seal(plaintext.as_bytes())
    }

    /// Decrypt a string field
    pub fn open_str(&self, data: &[u8]) -> std::result::Result<SecretString, DecryptionFailure> {
        self.open(data)?
            .into_secret_string()
            .ok_or(DecryptionFailure::InvalidUtf8)
    }

    /// Wipe the password material
    pub(crate) fn clear(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.secret);
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("secret", &"[REDACTED]")
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::fast_kdf_params;

    fn test_cipher(password: &str) -> FieldCipher {
        FieldCipher::new(password, fast_kdf_params())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = test_cipher("master");

        let long = "x".repeat(512);
        for plaintext in ["", "hunter2", "ünïcødé pass", long.as_str()] {
            let sealed = cipher.seal_str(plaintext).unwrap();
            assert_eq!(cipher.open_str(&sealed).unwrap().expose(), plaintext);
        }
    }

    #[test]
    fn test_layout_prefixes_salt() {
        let cipher = test_cipher("master");
        let sealed = cipher.seal(b"secret1").unwrap();

        assert_eq!(sealed.len(), MIN_FIELD_LEN + b"secret1".len());
        let field = EncryptedField::from_bytes(&sealed).unwrap();
        assert_eq!(field.to_bytes(), sealed);
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_call() {
        let cipher = test_cipher("master");

        let a = EncryptedField::from_bytes(&cipher.seal(b"same").unwrap()).unwrap();
        let b = EncryptedField::from_bytes(&cipher.seal(b"same").unwrap()).unwrap();

        assert_ne!(a.kdf_salt, b.kdf_salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.sealed, b.sealed);
    }

    #[test]
    fn test_wrong_password_fails() {
        let sealed = test_cipher("A").seal(b"secret1").unwrap();
        let result = test_cipher("B").open(&sealed);

        assert_eq!(result.unwrap_err(), DecryptionFailure::Authentication);
    }

    #[test]
    fn test_tampered_data_fails() {
        let cipher = test_cipher("master");
        let mut sealed = cipher.seal(b"secret data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        assert_eq!(
            cipher.open(&sealed).unwrap_err(),
            DecryptionFailure::Authentication
        );
    }

    #[test]
    fn test_truncated_data_fails() {
        let cipher = test_cipher("master");
        let sealed = cipher.seal(b"secret data").unwrap();

        assert_eq!(
            cipher.open(&sealed[..MIN_FIELD_LEN - 1]).unwrap_err(),
            DecryptionFailure::Truncated
        );
        assert_eq!(cipher.open(b"").unwrap_err(), DecryptionFailure::Truncated);
        assert_eq!(
            cipher.open(&sealed[..sealed.len() - 3]).unwrap_err(),
            DecryptionFailure::Authentication
        );
    }

    #[test]
    fn test_invalid_utf8_reported() {
        let cipher = test_cipher("master");
        let sealed = cipher.seal(&[0xff, 0xfe, 0xfd]).unwrap();

        assert_eq!(
            cipher.open_str(&sealed).unwrap_err(),
            DecryptionFailure::InvalidUtf8
        );
    }
}
