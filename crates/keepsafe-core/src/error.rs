//! Error types for keepsafe-core

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Why a single encrypted field could not be opened.
///
/// Decryption failures are local to one field: callers report them next to
/// that field and keep going.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptionFailure {
    #[error("ciphertext is truncated or malformed")]
    Truncated,

    #[error("authentication failed (wrong key or corrupted data)")]
    Authentication,

    #[error("decrypted data is not valid UTF-8")]
    InvalidUtf8,
}

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("{0}")]
    Validation(String),

    #[error("Unable to decrypt: {0}")]
    Decryption(#[from] DecryptionFailure),

    #[error("No master password is active - set or unlock it first")]
    NoMasterKey,

    #[error("A master password is already set")]
    AlreadyInitialized,

    #[error("Credential already exists: {0}")]
    AlreadyExists(String),

    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Transaction '{0}' was rolled back")]
    RolledBack(String),

    #[error("Dictionary error: {0}")]
    Dictionary(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    /// Validation and decryption failures are handed back to the caller to
    /// display; everything else aborts the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Decryption(_))
    }

    pub(crate) fn missing_name() -> Self {
        Self::Validation("Please fill in a name!".to_string())
    }
}
