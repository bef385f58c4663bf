//! Credential repository: CRUD over the credentials table

use std::cell::RefCell;
use std::path::Path;

use rusqlite::{params, ErrorCode};
use tracing::{debug, info};

use super::types::{ChangeEvent, CredentialRecord};
use crate::crypto::SecretBytes;
use crate::error::{Result, VaultError};
use crate::storage::{Abort, ScopeResult, Store, TxOutcome};

type RecordObserver = Box<dyn Fn(&CredentialRecord) + Send>;
type NameObserver = Box<dyn Fn(&str) + Send>;

const SELECT_COLUMNS: &str = "SELECT name, email, password, website FROM credentials";

/// Credential repository
///
/// Owns the transactional store. Observers registered here run after the
/// outermost transaction commits, on the committing thread, in
/// registration order; changes that are rolled back are never reported.
pub struct CredentialRepository {
    store: Store,
    on_submit: Vec<RecordObserver>,
    on_update: Vec<RecordObserver>,
    on_delete: Vec<NameObserver>,
    /// Changes made by the open transaction, dispatched on commit
    pending: RefCell<Vec<ChangeEvent>>,
}

impl CredentialRepository {
    /// Create a repository over an opened store
    pub fn new(store: Store) -> Self {
        Self {
            store,
            on_submit: Vec::new(),
            on_update: Vec::new(),
            on_delete: Vec::new(),
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Open the database file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Store::open_in_memory()?))
    }

    /// The underlying store
    ///
    /// Crate-private: every write scope goes through
    /// [`transaction`](Self::transaction) so change events stay in step with
    /// commits.
    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// Run `body` in a (possibly joined) transaction
    ///
    /// When this closes the outermost scope, queued change events are
    /// dispatched on commit and dropped otherwise.
    pub fn transaction<T, F>(&self, name: &str, body: F) -> TxOutcome<T>
    where
        F: FnOnce(&Store) -> ScopeResult<T>,
    {
        if !self.store.in_transaction() {
            // Leftovers of a scope that unwound or was closed elsewhere
            let stale = self.pending.take();
            if !stale.is_empty() {
                debug!("Dropping {} change event(s) that never committed", stale.len());
            }
        }

        let outcome = self.store.transaction(name, body);

        if !self.store.in_transaction() {
            let events = self.pending.take();
            if outcome.is_committed() {
                self.dispatch(&events);
            } else if !events.is_empty() {
                debug!("Discarding {} change event(s) from rolled back '{}'", events.len(), name);
            }
        }

        outcome
    }

    /// Check whether a credential with this name exists
    pub fn exists(&self, name: &str) -> Result<bool> {
        let found = self.store.fetch_optional(
            "SELECT 1 FROM credentials WHERE name = ?1",
            params![name],
            |_| Ok(()),
        )?;
        Ok(found.is_some())
    }

    /// Get a credential by name
    pub fn fetch_one(&self, name: &str) -> Result<Option<CredentialRecord>> {
        self.store.fetch_optional(
            &format!("{} WHERE name = ?1 LIMIT 1", SELECT_COLUMNS),
            params![name],
            CredentialRecord::from_row,
        )
    }

    /// List all credentials (no particular order)
    pub fn fetch_all(&self) -> Result<Vec<CredentialRecord>> {
        self.store
            .fetch_all(SELECT_COLUMNS, [], CredentialRecord::from_row)
    }

    /// Number of stored credentials
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .store
            .fetch_optional("SELECT COUNT(*) FROM credentials", [], |row| row.get(0))?
            .unwrap_or(0);
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Insert a new credential
    ///
    /// The password must already be encrypted.
    pub fn submit(&self, record: &CredentialRecord) -> Result<()> {
        if record.name.is_empty() {
            return Err(VaultError::missing_name());
        }

        let outcome = self.transaction("submit", |store| {
            let inserted = store.execute(
                "INSERT INTO credentials (name, email, password, website) VALUES (?1, ?2, ?3, ?4)",
                params![record.name, record.email, record.password, record.website],
            );
            match inserted {
                Err(VaultError::Database(err))
                    if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) =>
                {
                    return Err(VaultError::AlreadyExists(record.name.clone()).into());
                }
                other => other?,
            };
            self.queue(ChangeEvent::Submitted(record.clone()));
            Ok(())
        });
        committed("submit", outcome)?;

        info!("Added credential: {}", record.name);
        Ok(())
    }

    /// Overwrite email, password and website of an existing credential
    pub fn update(&self, record: &CredentialRecord) -> Result<()> {
        if record.name.is_empty() {
            return Err(VaultError::missing_name());
        }

        let outcome = self.transaction("update", |store| {
            let changed = store.execute(
                "UPDATE credentials SET email = ?2, password = ?3, website = ?4 WHERE name = ?1",
                params![record.name, record.email, record.password, record.website],
            )?;
            if changed == 0 {
                return Err(VaultError::CredentialNotFound(record.name.clone()).into());
            }
            self.queue(ChangeEvent::Updated(record.clone()));
            Ok(())
        });
        committed("update", outcome)?;

        debug!("Updated credential: {}", record.name);
        Ok(())
    }

    /// Delete a credential
    pub fn delete(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(VaultError::missing_name());
        }

        let outcome = self.transaction("delete", |store| {
            let changed = store.execute("DELETE FROM credentials WHERE name = ?1", params![name])?;
            if changed == 0 {
                return Err(VaultError::CredentialNotFound(name.to_string()).into());
            }
            self.queue(ChangeEvent::Deleted(name.to_string()));
            Ok(())
        });
        committed("delete", outcome)?;

        info!("Deleted credential: {}", name);
        Ok(())
    }

    /// Re-encrypt every stored password in one transaction
    ///
    /// Each row becomes `encrypt(decrypt(password))` and is written through
    /// [`update`](Self::update). The first failing row rolls the whole table
    /// back. Returns the number of rows rewritten.
    pub fn recipher<D, E>(&self, mut decrypt: D, mut encrypt: E) -> Result<usize>
    where
        D: FnMut(&[u8]) -> Result<SecretBytes>,
        E: FnMut(&[u8]) -> Result<Vec<u8>>,
    {
        let outcome = self.transaction("recipher", |_| {
            let rows = self.fetch_all()?;
            let total = rows.len();
            for mut row in rows {
                let plaintext = decrypt(&row.password).map_err(|err| {
                    debug!("Recipher stopped at '{}': {}", row.name, err);
                    Abort::Fail(err)
                })?;
                row.password = encrypt(plaintext.expose())?;
                self.update(&row)?;
            }
            Ok(total)
        });
        let total = committed("recipher", outcome)?;

        info!("Re-encrypted {} credential(s)", total);
        Ok(total)
    }

    /// Register a callback for committed inserts
    pub fn on_submit(&mut self, observer: impl Fn(&CredentialRecord) + Send + 'static) {
        self.on_submit.push(Box::new(observer));
    }

    /// Register a callback for committed updates
    pub fn on_update(&mut self, observer: impl Fn(&CredentialRecord) + Send + 'static) {
        self.on_update.push(Box::new(observer));
    }

    /// Register a callback for committed deletions
    pub fn on_delete(&mut self, observer: impl Fn(&str) + Send + 'static) {
        self.on_delete.push(Box::new(observer));
    }

    fn queue(&self, event: ChangeEvent) {
        self.pending.borrow_mut().push(event);
    }

    fn dispatch(&self, events: &[ChangeEvent]) {
        for event in events {
            match event {
                ChangeEvent::Submitted(record) => {
                    self.on_submit.iter().for_each(|observer| observer(record))
                }
                ChangeEvent::Updated(record) => {
                    self.on_update.iter().for_each(|observer| observer(record))
                }
                ChangeEvent::Deleted(name) => {
                    self.on_delete.iter().for_each(|observer| observer(name))
                }
            }
        }
    }
}

impl std::fmt::Debug for CredentialRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRepository")
            .field("store", &self.store)
            .field("observers", &(self.on_submit.len() + self.on_update.len() + self.on_delete.len()))
            .finish()
    }
}

/// Unwrap the outcome of a scope whose body never cancels
fn committed<T>(scope: &str, outcome: TxOutcome<T>) -> Result<T> {
    match outcome {
        TxOutcome::Committed(value) => Ok(value),
        TxOutcome::Cancelled => Err(VaultError::RolledBack(scope.to_string())),
        TxOutcome::Failed(err) => Err(err),
    }
}
