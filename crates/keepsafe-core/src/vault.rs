//! Vault orchestration
//!
//! [`Vault`] composes the credential repository, the master key manager, the
//! lazily built dictionary and the settings file into one handle that front
//! ends drive. It is `Send` but not `Sync`: one thread owns it, and a
//! multi-threaded host serializes access behind a single mutex.

use std::path::Path;

use tracing::{info, warn};

use crate::credential::{CredentialRecord, CredentialRepository};
use crate::crypto::{HashParams, KdfParams, SecretString};
use crate::dictionary::{DictionaryConfig, DictionaryIndex, LazyDictionary};
use crate::error::{Result, VaultError};
use crate::master::{KeyState, MasterKeyManager};
use crate::password::{is_weak_password, PasswordStrength};
use crate::settings::{default_storage_dir, SettingsManager};

/// Main vault struct
#[derive(Debug)]
pub struct Vault {
    repository: CredentialRepository,
    keys: MasterKeyManager,
    dictionary: Option<LazyDictionary>,
    /// Absent for in-memory vaults
    settings: Option<SettingsManager>,
}

impl Vault {
    /// Open (or create) the vault stored in `storage_dir`
    pub fn open(storage_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(storage_dir)?;

        let settings = SettingsManager::new(storage_dir);
        let repository = CredentialRepository::open(&settings.database_path())?;
        let keys = MasterKeyManager::new(settings.get().master_hash, settings.get().kdf);
        let dictionary = settings.dictionary_config().map(LazyDictionary::new);

        info!("Opened vault in {:?}", storage_dir);
        Ok(Self {
            repository,
            keys,
            dictionary,
            settings: Some(settings),
        })
    }

    /// Open the vault in the per-user data directory
    pub fn open_default() -> Result<Self> {
        Self::open(&default_storage_dir()?)
    }

    /// Create a throwaway vault backed by an in-memory database
    pub fn open_in_memory(hash_params: HashParams, kdf_params: KdfParams) -> Result<Self> {
        Ok(Self {
            repository: CredentialRepository::open_in_memory()?,
            keys: MasterKeyManager::new(hash_params, kdf_params),
            dictionary: None,
            settings: None,
        })
    }

    /// Use `config` as the common-password dictionary
    pub fn with_dictionary(mut self, config: DictionaryConfig) -> Self {
        self.dictionary = Some(LazyDictionary::new(config));
        self
    }

    pub fn state(&self) -> Result<KeyState> {
        self.keys.state(&self.repository)
    }

    pub fn is_unlocked(&self) -> bool {
        self.keys.is_unlocked()
    }

    pub fn has_master_password(&self) -> Result<bool> {
        self.keys.has_master_password(&self.repository)
    }

    pub fn check_password(&self, candidate: &str) -> Result<bool> {
        self.keys.check_password(&self.repository, candidate)
    }

    /// Set the first master password; the vault is unlocked afterwards
    pub fn initialize_password(&mut self, password: &str) -> Result<()> {
        if self.is_weak_password(password)? {
            warn!("New master password is weak");
        }
        self.keys.initialize_password(&self.repository, password)
    }

    pub fn unlock(&mut self, password: &str) -> Result<bool> {
        self.keys.unlock(&self.repository, password)
    }

    /// Forget the master password
    pub fn lock(&mut self) {
        self.keys.clear_password();
        info!("Vault locked");
    }

    /// Rotate the master password, re-encrypting every credential
    pub fn change_password(&mut self, new_password: &str) -> Result<usize> {
        if self.is_weak_password(new_password)? {
            warn!("New master password is weak");
        }
        self.keys.change_password(&self.repository, new_password)
    }

    /// Encrypt `password` and store a new credential
    pub fn add_credential(
        &self,
        name: &str,
        email: &str,
        password: &str,
        website: &str,
    ) -> Result<()> {
        let record = self.seal_record(name, email, password, website)?;
        self.repository.submit(&record)
    }

    /// Encrypt `password` and overwrite an existing credential
    pub fn update_credential(
        &self,
        name: &str,
        email: &str,
        password: &str,
        website: &str,
    ) -> Result<()> {
        let record = self.seal_record(name, email, password, website)?;
        self.repository.update(&record)
    }

    pub fn delete_credential(&self, name: &str) -> Result<()> {
        self.repository.delete(name)
    }

    pub fn credential(&self, name: &str) -> Result<Option<CredentialRecord>> {
        self.repository.fetch_one(name)
    }

    /// All credentials, sorted by name
    pub fn credentials(&self) -> Result<Vec<CredentialRecord>> {
        let mut records = self.repository.fetch_all()?;
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Decrypt the stored password of `name`
    ///
    /// `Ok(None)` means this one field could not be decrypted; the failure
    /// is logged and the rest of the vault stays usable.
    pub fn reveal_password(&self, name: &str) -> Result<Option<SecretString>> {
        let record = self
            .repository
            .fetch_one(name)?
            .ok_or_else(|| VaultError::CredentialNotFound(name.to_string()))?;

        self.keys.decrypt_with(&record.password, |failure| {
            warn!("Unable to decrypt password of '{}': {}", name, failure);
        })
    }

    pub fn repository(&self) -> &CredentialRepository {
        &self.repository
    }

    /// Mutable access, for registering observers
    pub fn repository_mut(&mut self) -> &mut CredentialRepository {
        &mut self.repository
    }

    pub fn keys(&self) -> &MasterKeyManager {
        &self.keys
    }

    pub fn settings(&self) -> Option<&SettingsManager> {
        self.settings.as_ref()
    }

    /// The dictionary index, built on first call
    pub fn dictionary(&self) -> Result<Option<&DictionaryIndex>> {
        self.dictionary.as_ref().map(LazyDictionary::get).transpose()
    }

    pub fn is_weak_password(&self, password: &str) -> Result<bool> {
        is_weak_password(password, self.dictionary()?)
    }

    pub fn strength(&self, password: &str) -> Result<PasswordStrength> {
        PasswordStrength::estimate(password, self.dictionary()?)
    }

    fn seal_record(
        &self,
        name: &str,
        email: &str,
        password: &str,
        website: &str,
    ) -> Result<CredentialRecord> {
        if name.is_empty() {
            return Err(VaultError::missing_name());
        }
        let encrypted = self.keys.encrypt(password)?;
        Ok(CredentialRecord::new(name, email, encrypted, website))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{fast_hash_params, fast_kdf_params};
    use crate::settings::SETTINGS_FILE;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn memory_vault() -> Vault {
        Vault::open_in_memory(fast_hash_params(), fast_kdf_params()).unwrap()
    }

    /// Storage directory whose settings keep the KDFs cheap
    fn fast_storage_dir() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(SETTINGS_FILE),
            r#"{
                "kdf": { "iterations": 1000 },
                "masterHash": { "memoryCost": 8192, "timeCost": 1, "parallelism": 1 },
                "dictionary": { "source": "common.txt" }
            }"#,
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("common.txt"), "letmein\nsunshine\n").unwrap();
        temp_dir
    }

    #[test]
    fn test_vault_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Vault>();
    }

    #[test]
    fn test_credential_lifecycle() {
        let mut vault = memory_vault();
        assert_eq!(vault.state().unwrap(), KeyState::Unset);

        vault.initialize_password("A").unwrap();
        vault
            .add_credential("alice", "alice@x.com", "secret1", "http://x.com")
            .unwrap();

        let stored = vault.credential("alice").unwrap().unwrap();
        assert_ne!(stored.password, b"secret1");
        assert_eq!(vault.reveal_password("alice").unwrap().unwrap().expose(), "secret1");

        vault
            .update_credential("alice", "alice@y.com", "secret2", "http://y.com")
            .unwrap();
        assert_eq!(vault.reveal_password("alice").unwrap().unwrap().expose(), "secret2");
        assert_eq!(vault.credential("alice").unwrap().unwrap().email, "alice@y.com");

        vault.delete_credential("alice").unwrap();
        assert!(vault.credential("alice").unwrap().is_none());
        assert!(matches!(
            vault.reveal_password("alice"),
            Err(VaultError::CredentialNotFound(_))
        ));
    }

    #[test]
    fn test_locked_vault_refuses_secrets() {
        let mut vault = memory_vault();
        vault.initialize_password("A").unwrap();
        vault.add_credential("alice", "", "secret1", "").unwrap();

        vault.lock();
        assert_eq!(vault.state().unwrap(), KeyState::Locked);
        assert!(matches!(
            vault.add_credential("bob", "", "p", ""),
            Err(VaultError::NoMasterKey)
        ));
        assert!(matches!(vault.reveal_password("alice"), Err(VaultError::NoMasterKey)));

        assert!(!vault.unlock("B").unwrap());
        assert!(vault.unlock("A").unwrap());
        assert_eq!(vault.reveal_password("alice").unwrap().unwrap().expose(), "secret1");
    }

    #[test]
    fn test_empty_name_checked_before_encryption() {
        let vault = memory_vault();

        // Validation wins over the missing key
        assert!(matches!(
            vault.add_credential("", "e", "p", "w"),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn test_change_password_keeps_credentials_readable() {
        let mut vault = memory_vault();
        vault.initialize_password("A").unwrap();
        vault.add_credential("alice", "", "secret1", "").unwrap();
        vault.add_credential("bob", "", "secret2", "").unwrap();

        assert_eq!(vault.change_password("B").unwrap(), 2);
        vault.lock();
        assert!(!vault.unlock("A").unwrap());
        assert!(vault.unlock("B").unwrap());
        assert_eq!(vault.reveal_password("bob").unwrap().unwrap().expose(), "secret2");
    }

    #[test]
    fn test_undecryptable_field_is_reported_not_fatal() {
        let mut vault = memory_vault();
        vault.initialize_password("A").unwrap();
        vault.add_credential("alice", "", "secret1", "").unwrap();
        vault
            .repository()
            .submit(&CredentialRecord::new("broken", "", vec![7u8; 90], ""))
            .unwrap();

        assert!(vault.reveal_password("broken").unwrap().is_none());
        assert_eq!(vault.reveal_password("alice").unwrap().unwrap().expose(), "secret1");
    }

    #[test]
    fn test_observers_through_vault() {
        let mut vault = memory_vault();
        vault.initialize_password("A").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        vault
            .repository_mut()
            .on_submit(move |record| sink.lock().unwrap().push(record.name.clone()));

        vault.add_credential("alice", "", "p", "").unwrap();
        vault.add_credential("bob", "", "p", "").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_reopen_from_disk() {
        let temp_dir = fast_storage_dir();

        {
            let mut vault = Vault::open(temp_dir.path()).unwrap();
            assert_eq!(vault.settings().unwrap().get().kdf.iterations, 1000);
            vault.initialize_password("correct horse battery").unwrap();
            vault.add_credential("alice", "", "secret1", "").unwrap();
            vault.add_credential("bob", "", "secret2", "").unwrap();
        }

        let mut vault = Vault::open(temp_dir.path()).unwrap();
        assert_eq!(vault.state().unwrap(), KeyState::Locked);
        assert!(vault.unlock("correct horse battery").unwrap());

        let names: Vec<String> = vault.credentials().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(vault.reveal_password("bob").unwrap().unwrap().expose(), "secret2");
    }

    #[test]
    fn test_edited_kdf_settings_keep_credentials_readable() {
        let temp_dir = fast_storage_dir();
        {
            let mut vault = Vault::open(temp_dir.path()).unwrap();
            vault.initialize_password("A").unwrap();
            vault.add_credential("alice", "", "secret1", "").unwrap();
        }

        std::fs::write(
            temp_dir.path().join(SETTINGS_FILE),
            r#"{
                "kdf": { "iterations": 2000 },
                "masterHash": { "memoryCost": 16384, "timeCost": 1, "parallelism": 1 }
            }"#,
        )
        .unwrap();

        let mut vault = Vault::open(temp_dir.path()).unwrap();
        assert_eq!(vault.settings().unwrap().get().kdf.iterations, 2000);
        assert!(vault.unlock("A").unwrap());
        assert_eq!(vault.reveal_password("alice").unwrap().unwrap().expose(), "secret1");
    }

    #[test]
    fn test_dictionary_from_settings() {
        let temp_dir = fast_storage_dir();
        let vault = Vault::open(temp_dir.path()).unwrap();

        assert!(!temp_dir.path().join("common.ws").exists());
        assert_eq!(vault.strength("sunshine").unwrap(), PasswordStrength::VeryWeak);
        assert!(temp_dir.path().join("common.ws").exists());
        assert_eq!(vault.dictionary().unwrap().unwrap().len(), 2);

        assert!(vault.is_weak_password("letmein").unwrap());
        assert!(!vault.is_weak_password("a-long-unlisted-passphrase").unwrap());
    }

    #[test]
    fn test_memory_vault_without_dictionary() {
        let vault = memory_vault();
        assert!(vault.dictionary().unwrap().is_none());
        assert!(vault.settings().is_none());
        assert_eq!(vault.strength("Abcdefgh1234!xyz").unwrap(), PasswordStrength::Strong);
    }
}
