//! Master password verification, the active field cipher and key rotation

use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::credential::CredentialRepository;
use crate::crypto::{
    generate_salt, hash_master_password, FieldCipher, HashParams, KdfParams, SecretString,
    KEY_LEN, SALT_LEN,
};
use crate::error::{DecryptionFailure, Result, VaultError};
use crate::storage::{load_master_hash, save_master_hash, MasterHashRow, TxOutcome};

/// Lifecycle of the master password
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// No master password has ever been set
    Unset,
    /// A master password is set but no cipher is active in this process
    Locked,
    /// A master password is set and its cipher is active
    Unlocked,
}

/// In-memory cipher state, never persisted
#[derive(Debug)]
pub enum CipherState {
    NoKey,
    Keyed(FieldCipher),
}

/// Stored verification hash with the parameters of both derivations
#[derive(Clone, PartialEq, Eq)]
pub struct MasterPasswordRecord {
    salt: [u8; SALT_LEN],
    hash: [u8; KEY_LEN],
    hash_params: HashParams,
    kdf_params: KdfParams,
}

impl MasterPasswordRecord {
    /// Hash `password` under a fresh random salt
    pub fn derive(password: &str, hash_params: HashParams, kdf_params: KdfParams) -> Result<Self> {
        let salt = generate_salt();
        let hash = hash_master_password(password, &salt, &hash_params)?;
        Ok(Self {
            salt,
            hash,
            hash_params,
            kdf_params,
        })
    }

    /// Parse the stored row; `None` if the hash has the wrong size
    pub fn from_row(row: &MasterHashRow) -> Option<Self> {
        let blob = &row.hashed_password;
        if blob.len() != SALT_LEN + KEY_LEN {
            return None;
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&blob[..SALT_LEN]);
        let mut hash = [0u8; KEY_LEN];
        hash.copy_from_slice(&blob[SALT_LEN..]);
        Some(Self {
            salt,
            hash,
            hash_params: row.hash_params,
            kdf_params: row.kdf_params,
        })
    }

    pub fn to_row(&self) -> MasterHashRow {
        MasterHashRow {
            hashed_password: [self.salt.as_slice(), self.hash.as_slice()].concat(),
            hash_params: self.hash_params,
            kdf_params: self.kdf_params,
        }
    }

    /// Parameters the field cipher of this password must use
    pub fn kdf_params(&self) -> KdfParams {
        self.kdf_params
    }

    /// Recompute the hash of `candidate` under the stored salt and compare
    pub fn verify(&self, candidate: &str) -> Result<bool> {
        let computed = hash_master_password(candidate, &self.salt, &self.hash_params)?;
        Ok(computed.ct_eq(&self.hash).into())
    }
}

impl std::fmt::Debug for MasterPasswordRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterPasswordRecord")
            .field("salt", &"[REDACTED]")
            .field("hash", &"[REDACTED]")
            .field("hash_params", &self.hash_params)
            .field("kdf_params", &self.kdf_params)
            .finish()
    }
}

/// Lowest PBKDF2 iteration count accepted for a new master password
#[cfg(not(test))]
const ITERATION_FLOOR: u32 = KdfParams::MIN_ITERATIONS;
#[cfg(test)]
const ITERATION_FLOOR: u32 = 1;

/// Owns the active cipher and orchestrates master-password changes
///
/// Storage lives in the [`CredentialRepository`]; every method that touches
/// it takes the repository explicitly. The manager's parameters only apply
/// to passwords it sets; unlocking always uses the parameters stored with
/// the hash.
#[derive(Debug)]
pub struct MasterKeyManager {
    cipher: CipherState,
    hash_params: HashParams,
    kdf_params: KdfParams,
    iteration_floor: u32,
}

impl MasterKeyManager {
    /// Create a manager with no active cipher
    pub fn new(hash_params: HashParams, kdf_params: KdfParams) -> Self {
        Self {
            cipher: CipherState::NoKey,
            hash_params,
            kdf_params,
            iteration_floor: ITERATION_FLOOR,
        }
    }

    pub fn cipher_state(&self) -> &CipherState {
        &self.cipher
    }

    /// Whether a cipher is active in this process
    pub fn is_unlocked(&self) -> bool {
        matches!(self.cipher, CipherState::Keyed(_))
    }

    /// Current lifecycle state
    pub fn state(&self, repo: &CredentialRepository) -> Result<KeyState> {
        if self.is_unlocked() {
            return Ok(KeyState::Unlocked);
        }
        if self.has_master_password(repo)? {
            Ok(KeyState::Locked)
        } else {
            Ok(KeyState::Unset)
        }
    }

    /// Whether a master-password row exists
    pub fn has_master_password(&self, repo: &CredentialRepository) -> Result<bool> {
        Ok(load_master_hash(repo.store())?.is_some())
    }

    /// Compare `candidate` with the stored hash; `false` when unset
    pub fn check_password(&self, repo: &CredentialRepository, candidate: &str) -> Result<bool> {
        match load_record(repo)? {
            Some(record) => record.verify(candidate),
            None => Ok(false),
        }
    }

    /// Set the first master password and activate its cipher
    pub fn initialize_password(&mut self, repo: &CredentialRepository, password: &str) -> Result<()> {
        self.kdf_params.ensure_at_least(self.iteration_floor)?;
        let record = MasterPasswordRecord::derive(password, self.hash_params, self.kdf_params)?;

        let outcome = repo.transaction("initialize_master_password", |store| {
            if load_master_hash(store)?.is_some() {
                return Err(VaultError::AlreadyInitialized.into());
            }
            save_master_hash(store, &record.to_row())?;
            Ok(())
        });
        finish("initialize_master_password", outcome)?;

        self.activate(FieldCipher::new(password, record.kdf_params()));
        info!("Master password initialized");
        Ok(())
    }

    /// Verify `candidate` and, on success, activate its cipher
    pub fn unlock(&mut self, repo: &CredentialRepository, candidate: &str) -> Result<bool> {
        let Some(record) = load_record(repo)? else {
            return Ok(false);
        };
        if !record.verify(candidate)? {
            debug!("Master password rejected");
            return Ok(false);
        }
        if record.kdf_params() != self.kdf_params {
            debug!(
                "Using stored field key parameters ({} iterations, configured {})",
                record.kdf_params().iterations,
                self.kdf_params.iterations
            );
        }
        self.activate(FieldCipher::new(candidate, record.kdf_params()));
        info!("Vault unlocked");
        Ok(true)
    }

    /// Rotate to `new_password`, re-encrypting every stored credential
    ///
    /// Re-encryption and the new hash commit together. On any failure the
    /// previous hash and cipher stay in force and the store is untouched.
    /// Returns the number of credentials re-encrypted.
    pub fn change_password(
        &mut self,
        repo: &CredentialRepository,
        new_password: &str,
    ) -> Result<usize> {
        let CipherState::Keyed(old) = &self.cipher else {
            return Err(VaultError::NoMasterKey);
        };
        self.kdf_params.ensure_at_least(self.iteration_floor)?;
        let record = MasterPasswordRecord::derive(new_password, self.hash_params, self.kdf_params)?;
        let new_cipher = FieldCipher::new(new_password, record.kdf_params());

        let outcome = repo.transaction("change_master_password", |store| {
            let total = repo.recipher(
                |ciphertext| old.open(ciphertext).map_err(VaultError::from),
                |plaintext| new_cipher.seal(plaintext),
            )?;
            save_master_hash(store, &record.to_row())?;
            Ok(total)
        });
        let total = match finish("change_master_password", outcome) {
            Ok(total) => total,
            Err(err) => {
                warn!("Master password change aborted: {}", err);
                return Err(err);
            }
        };

        self.activate(new_cipher);
        info!("Master password changed ({} credential(s) re-encrypted)", total);
        Ok(total)
    }

    /// Encrypt a password field with the active cipher
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        match &self.cipher {
            CipherState::Keyed(cipher) => cipher.seal_str(plaintext),
            CipherState::NoKey => Err(VaultError::NoMasterKey),
        }
    }

    /// Decrypt a password field with the active cipher
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<SecretString> {
        match &self.cipher {
            CipherState::Keyed(cipher) => Ok(cipher.open_str(ciphertext)?),
            CipherState::NoKey => Err(VaultError::NoMasterKey),
        }
    }

    /// Decrypt, handing any decryption failure to `on_failure`
    ///
    /// Returns `Ok(None)` after reporting; only a missing cipher is an error.
    pub fn decrypt_with<F>(&self, ciphertext: &[u8], on_failure: F) -> Result<Option<SecretString>>
    where
        F: FnOnce(&DecryptionFailure),
    {
        match self.decrypt(ciphertext) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(VaultError::Decryption(failure)) => {
                on_failure(&failure);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Wipe the password material and deactivate the cipher
    pub fn clear_password(&mut self) {
        if let CipherState::Keyed(cipher) = &mut self.cipher {
            cipher.clear();
        }
        self.cipher = CipherState::NoKey;
        debug!("Master password cleared from memory");
    }

    fn activate(&mut self, cipher: FieldCipher) {
        let previous = std::mem::replace(&mut self.cipher, CipherState::Keyed(cipher));
        if let CipherState::Keyed(mut old) = previous {
            old.clear();
        }
    }
}

impl Default for MasterKeyManager {
    fn default() -> Self {
        Self::new(HashParams::default(), KdfParams::default())
    }
}

fn load_record(repo: &CredentialRepository) -> Result<Option<MasterPasswordRecord>> {
    let Some(row) = load_master_hash(repo.store())? else {
        return Ok(None);
    };
    let record = MasterPasswordRecord::from_row(&row);
    if record.is_none() {
        warn!(
            "Stored master password hash has unexpected length {}",
            row.hashed_password.len()
        );
    }
    Ok(record)
}

fn finish<T>(scope: &str, outcome: TxOutcome<T>) -> Result<T> {
    outcome
        .into_result()?
        .ok_or_else(|| VaultError::RolledBack(scope.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialRecord;
    use crate::crypto::{fast_hash_params, fast_kdf_params};

    fn setup() -> (CredentialRepository, MasterKeyManager) {
        let repo = CredentialRepository::open_in_memory().unwrap();
        let keys = MasterKeyManager::new(fast_hash_params(), fast_kdf_params());
        (repo, keys)
    }

    fn submit(repo: &CredentialRepository, keys: &MasterKeyManager, name: &str, password: &str) {
        let encrypted = keys.encrypt(password).unwrap();
        repo.submit(&CredentialRecord::new(name, "", encrypted, ""))
            .unwrap();
    }

    fn stored_password(repo: &CredentialRepository, name: &str) -> Vec<u8> {
        repo.fetch_one(name).unwrap().unwrap().password
    }

    #[test]
    fn test_state_transitions() {
        let (repo, mut keys) = setup();
        assert_eq!(keys.state(&repo).unwrap(), KeyState::Unset);
        assert!(!keys.check_password(&repo, "anything").unwrap());

        keys.initialize_password(&repo, "A").unwrap();
        assert_eq!(keys.state(&repo).unwrap(), KeyState::Unlocked);
        assert!(keys.has_master_password(&repo).unwrap());

        keys.clear_password();
        assert_eq!(keys.state(&repo).unwrap(), KeyState::Locked);

        assert!(!keys.unlock(&repo, "wrong").unwrap());
        assert_eq!(keys.state(&repo).unwrap(), KeyState::Locked);

        assert!(keys.unlock(&repo, "A").unwrap());
        assert_eq!(keys.state(&repo).unwrap(), KeyState::Unlocked);
    }

    #[test]
    fn test_initialize_twice_rejected() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "A").unwrap();

        let result = keys.initialize_password(&repo, "B");
        assert!(matches!(result, Err(VaultError::AlreadyInitialized)));
        assert!(keys.check_password(&repo, "A").unwrap());
        assert!(!keys.check_password(&repo, "B").unwrap());
    }

    #[test]
    fn test_stored_hash_layout() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "A").unwrap();

        let row = load_master_hash(repo.store()).unwrap().unwrap();
        assert_eq!(row.hashed_password.len(), SALT_LEN + KEY_LEN);
        assert_eq!(row.hash_params, fast_hash_params());
        assert_eq!(row.kdf_params, fast_kdf_params());
        let record = MasterPasswordRecord::from_row(&row).unwrap();
        assert_eq!(record.to_row(), row);
    }

    #[test]
    fn test_unlock_uses_stored_params() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "A").unwrap();
        submit(&repo, &keys, "alice", "secret1");

        let mut reconfigured = MasterKeyManager::new(
            HashParams {
                memory_cost: 16384,
                ..fast_hash_params()
            },
            KdfParams { iterations: 2_000 },
        );
        assert!(reconfigured.check_password(&repo, "A").unwrap());
        assert!(reconfigured.unlock(&repo, "A").unwrap());
        assert_eq!(
            reconfigured
                .decrypt(&stored_password(&repo, "alice"))
                .unwrap()
                .expose(),
            "secret1"
        );
    }

    #[test]
    fn test_change_password_stores_current_params() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "A").unwrap();
        submit(&repo, &keys, "alice", "secret1");

        let mut upgraded = MasterKeyManager::new(fast_hash_params(), KdfParams { iterations: 2_000 });
        assert!(upgraded.unlock(&repo, "A").unwrap());
        upgraded.change_password(&repo, "B").unwrap();

        let row = load_master_hash(repo.store()).unwrap().unwrap();
        assert_eq!(row.kdf_params.iterations, 2_000);

        // a manager still configured with the old parameters follows the row
        let mut stale = MasterKeyManager::new(fast_hash_params(), fast_kdf_params());
        assert!(stale.unlock(&repo, "B").unwrap());
        assert_eq!(
            stale.decrypt(&stored_password(&repo, "alice")).unwrap().expose(),
            "secret1"
        );
    }

    #[test]
    fn test_weak_kdf_rejected_for_new_password() {
        let (repo, mut keys) = setup();
        keys.iteration_floor = KdfParams::MIN_ITERATIONS;

        let result = keys.initialize_password(&repo, "A");
        assert!(matches!(result, Err(VaultError::KeyDerivation(_))));
        assert_eq!(keys.state(&repo).unwrap(), KeyState::Unset);

        keys.iteration_floor = ITERATION_FLOOR;
        keys.initialize_password(&repo, "A").unwrap();
        keys.iteration_floor = KdfParams::MIN_ITERATIONS;
        assert!(matches!(
            keys.change_password(&repo, "B"),
            Err(VaultError::KeyDerivation(_))
        ));
        assert!(keys.check_password(&repo, "A").unwrap());
    }

    #[test]
    fn test_no_key_is_precondition_error() {
        let (_repo, keys) = setup();

        assert!(matches!(keys.encrypt("p"), Err(VaultError::NoMasterKey)));
        assert!(matches!(keys.decrypt(&[0u8; 80]), Err(VaultError::NoMasterKey)));
        assert!(matches!(
            keys.decrypt_with(&[0u8; 80], |_| panic!("not a decryption failure")),
            Err(VaultError::NoMasterKey)
        ));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "correct horse battery staple").unwrap();

        for plaintext in ["", "p", "hunter2", "with spaces and ünicode ✓"] {
            let ciphertext = keys.encrypt(plaintext).unwrap();
            assert_ne!(ciphertext, plaintext.as_bytes());
            assert_eq!(keys.decrypt(&ciphertext).unwrap().expose(), plaintext);
        }
    }

    #[test]
    fn test_decrypt_with_reports_failure() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "A").unwrap();

        let mut reported = None;
        let result = keys
            .decrypt_with(b"garbage", |failure| reported = Some(*failure))
            .unwrap();

        assert!(result.is_none());
        assert_eq!(reported, Some(DecryptionFailure::Truncated));
    }

    #[test]
    fn test_change_password_reencrypts() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "A").unwrap();
        submit(&repo, &keys, "alice", "secret1");
        submit(&repo, &keys, "bob", "secret2");
        let before = stored_password(&repo, "alice");

        let total = keys.change_password(&repo, "B").unwrap();
        assert_eq!(total, 2);

        let after = stored_password(&repo, "alice");
        assert_ne!(before, after);
        assert_eq!(keys.decrypt(&after).unwrap().expose(), "secret1");
        assert_eq!(
            keys.decrypt(&stored_password(&repo, "bob")).unwrap().expose(),
            "secret2"
        );

        let old_cipher = FieldCipher::new("A", fast_kdf_params());
        assert_eq!(
            old_cipher.open(&after).unwrap_err(),
            DecryptionFailure::Authentication
        );

        assert!(keys.check_password(&repo, "B").unwrap());
        assert!(!keys.check_password(&repo, "A").unwrap());
    }

    #[test]
    fn test_change_password_is_atomic() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "A").unwrap();
        submit(&repo, &keys, "alice", "secret1");
        repo.submit(&CredentialRecord::new("broken", "", vec![0xAB; 70], ""))
            .unwrap();
        submit(&repo, &keys, "carol", "secret3");
        let alice_before = stored_password(&repo, "alice");
        let carol_before = stored_password(&repo, "carol");
        let hash_before = load_master_hash(repo.store()).unwrap();

        let result = keys.change_password(&repo, "B");
        assert!(matches!(result, Err(VaultError::Decryption(_))));

        assert_eq!(stored_password(&repo, "alice"), alice_before);
        assert_eq!(stored_password(&repo, "carol"), carol_before);
        assert_eq!(stored_password(&repo, "broken"), vec![0xAB; 70]);
        assert_eq!(load_master_hash(repo.store()).unwrap(), hash_before);

        // old cipher still active, old password still valid
        assert!(keys.is_unlocked());
        assert_eq!(keys.decrypt(&alice_before).unwrap().expose(), "secret1");
        assert!(keys.check_password(&repo, "A").unwrap());
        assert!(!keys.check_password(&repo, "B").unwrap());
    }

    #[test]
    fn test_change_password_requires_active_cipher() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "A").unwrap();
        keys.clear_password();

        assert!(matches!(
            keys.change_password(&repo, "B"),
            Err(VaultError::NoMasterKey)
        ));
        assert!(keys.check_password(&repo, "A").unwrap());
    }

    #[test]
    fn test_clear_password_drops_cipher() {
        let (repo, mut keys) = setup();
        keys.initialize_password(&repo, "A").unwrap();
        assert!(matches!(keys.cipher_state(), CipherState::Keyed(_)));

        keys.clear_password();
        assert!(matches!(keys.cipher_state(), CipherState::NoKey));
        assert!(matches!(keys.encrypt("p"), Err(VaultError::NoMasterKey)));
    }

    #[test]
    fn test_record_rejects_wrong_length() {
        let row = |len: usize| MasterHashRow {
            hashed_password: vec![0u8; len],
            hash_params: fast_hash_params(),
            kdf_params: fast_kdf_params(),
        };
        assert!(MasterPasswordRecord::from_row(&row(63)).is_none());
        assert!(MasterPasswordRecord::from_row(&row(65)).is_none());
        assert!(MasterPasswordRecord::from_row(&row(64)).is_some());
    }
}
