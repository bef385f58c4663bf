//! # keepsafe-core
//!
//! Core of the keepsafe credential store:
//! - SQLite persistence with nestable, joinable transactions
//! - Credential CRUD with change observers that run after commit
//! - Master password hashing (Argon2id) and per-field AES-256-GCM
//!   encryption under PBKDF2-derived keys, with atomic key rotation
//! - On-disk sorted dictionary for common-password checks
//! - Zeroize-on-drop handling of every secret held in memory

pub mod credential;
pub mod crypto;
pub mod dictionary;
pub mod error;
pub mod master;
pub mod password;
pub mod settings;
pub mod storage;
mod vault;

pub use credential::{ChangeEvent, CredentialRecord, CredentialRepository, Field, FIELDS};
pub use crypto::{FieldCipher, HashParams, KdfParams, SecretString};
pub use dictionary::{DictionaryConfig, DictionaryIndex, LazyDictionary};
pub use error::{DecryptionFailure, Result, VaultError};
pub use master::{CipherState, KeyState, MasterKeyManager};
pub use password::{generate_password, is_weak_password, CharsetOptions, PasswordStrength};
pub use settings::{Settings, SettingsManager};
pub use storage::{Abort, Store, TxOutcome};
pub use vault::Vault;
