//! Credential type definitions

use rusqlite::Row;

/// One stored credential
///
/// `password` is always ciphertext produced by the master key manager;
/// plaintext never reaches the store.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Unique, non-empty name (primary key)
    pub name: String,

    /// Account email or user name
    pub email: String,

    /// Encrypted password (`kdf_salt || nonce || ciphertext || tag`)
    pub password: Vec<u8>,

    /// Website the credential belongs to
    pub website: String,
}

impl CredentialRecord {
    /// Create a record around an already-encrypted password
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: Vec<u8>,
        website: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password,
            website: website.into(),
        }
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            email: row.get(1)?,
            password: row.get(2)?,
            website: row.get(3)?,
        })
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &format_args!("<{} encrypted bytes>", self.password.len()))
            .field("website", &self.website)
            .finish()
    }
}

/// Committed change, delivered to repository observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Submitted(CredentialRecord),
    Updated(CredentialRecord),
    Deleted(String),
}

impl ChangeEvent {
    /// Name of the affected credential
    pub fn name(&self) -> &str {
        match self {
            Self::Submitted(record) | Self::Updated(record) => &record.name,
            Self::Deleted(name) => name,
        }
    }
}
