//! Nestable transactions over the SQLite database
//!
//! Only the outermost scope talks to SQLite (`BEGIN IMMEDIATE` ... `COMMIT`
//! or `ROLLBACK`). A scope opened while another is active joins it: its
//! writes become durable only when the outermost scope commits, and a
//! cancel or failure anywhere dooms the whole unit.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Params, Row};
use tracing::{debug, trace, warn};

use super::schema;
use crate::error::{Result, VaultError};

/// Why a transaction body stopped early
#[derive(Debug)]
pub enum Abort {
    /// Roll back quietly; reported as [`TxOutcome::Cancelled`]
    Cancel,
    /// Roll back and report the error
    Fail(VaultError),
}

impl From<VaultError> for Abort {
    fn from(err: VaultError) -> Self {
        Self::Fail(err)
    }
}

impl From<rusqlite::Error> for Abort {
    fn from(err: rusqlite::Error) -> Self {
        Self::Fail(err.into())
    }
}

/// Result type for transaction bodies
pub type ScopeResult<T> = std::result::Result<T, Abort>;

/// Outcome of a transaction scope
///
/// For a nested scope `Committed` means the body finished and its writes
/// joined the enclosing transaction.
#[derive(Debug)]
pub enum TxOutcome<T> {
    Committed(T),
    Cancelled,
    Failed(VaultError),
}

impl<T> TxOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// `Cancelled` becomes `Ok(None)`; only failures are errors.
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            Self::Committed(value) => Ok(Some(value)),
            Self::Cancelled => Ok(None),
            Self::Failed(err) => Err(err),
        }
    }

    /// Re-raise the outcome inside an enclosing scope body
    pub fn scoped(self) -> ScopeResult<T> {
        match self {
            Self::Committed(value) => Ok(value),
            Self::Cancelled => Err(Abort::Cancel),
            Self::Failed(err) => Err(Abort::Fail(err)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Doom {
    Cancelled,
    Failed,
}

/// Transactional store wrapping one SQLite connection
///
/// `Send` but not `Sync`: scopes and primitives run on the thread that owns
/// the store. Hosts with several threads put the owner behind one mutex.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
    depth: Cell<u32>,
    doom: Cell<Option<Doom>>,
}

impl Store {
    /// Open (or create) the database file and its tables
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA secure_delete=ON;")?;
        debug!("Opened credential database at {:?}", path);
        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        schema::create_tables(&conn)?;
        Ok(Self {
            conn,
            path,
            depth: Cell::new(0),
            doom: Cell::new(None),
        })
    }

    /// Database file path (`None` when in memory)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether a scope is currently open
    pub fn in_transaction(&self) -> bool {
        self.depth.get() > 0
    }

    /// Number of currently open (joined) scopes
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Run `body` as one atomic unit, joining the enclosing scope if any
    pub fn transaction<T, F>(&self, name: &str, body: F) -> TxOutcome<T>
    where
        F: FnOnce(&Self) -> ScopeResult<T>,
    {
        let outermost = !self.in_transaction();
        if outermost {
            if let Err(err) = self.conn.execute_batch("BEGIN IMMEDIATE") {
                return TxOutcome::Failed(err.into());
            }
            self.doom.set(None);
            trace!(scope = name, "transaction begin");
        } else {
            trace!(scope = name, depth = self.depth.get(), "joining transaction");
        }

        self.depth.set(self.depth.get() + 1);
        let mut guard = ScopeGuard {
            store: self,
            outermost,
            completed: false,
        };
        let result = body(self);
        guard.completed = true;
        drop(guard);

        if outermost {
            self.finish_outermost(name, result)
        } else {
            self.finish_nested(result)
        }
    }

    /// Abort the current scope without reporting an error
    pub fn cancel<T>() -> ScopeResult<T> {
        Err(Abort::Cancel)
    }

    /// Execute a statement, returning the number of changed rows
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    /// Run a query and map every row
    pub fn fetch_all<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    /// Run a query expected to return at most one row
    pub fn fetch_optional<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.conn.query_row(sql, params, map).optional()?)
    }

    fn finish_nested<T>(&self, result: ScopeResult<T>) -> TxOutcome<T> {
        match result {
            Ok(value) => TxOutcome::Committed(value),
            Err(Abort::Cancel) => {
                self.mark_doomed(Doom::Cancelled);
                TxOutcome::Cancelled
            }
            Err(Abort::Fail(err)) => {
                self.mark_doomed(Doom::Failed);
                TxOutcome::Failed(err)
            }
        }
    }

    fn finish_outermost<T>(&self, name: &str, result: ScopeResult<T>) -> TxOutcome<T> {
        let doom = self.doom.take();
        match (result, doom) {
            (Ok(value), None) => match self.conn.execute_batch("COMMIT") {
                Ok(()) => {
                    trace!(scope = name, "transaction committed");
                    TxOutcome::Committed(value)
                }
                Err(err) => {
                    self.rollback(name);
                    TxOutcome::Failed(err.into())
                }
            },
            (Ok(_), Some(Doom::Cancelled)) | (Err(Abort::Cancel), _) => {
                self.rollback(name);
                debug!(scope = name, "transaction cancelled");
                TxOutcome::Cancelled
            }
            (Ok(_), Some(Doom::Failed)) => {
                self.rollback(name);
                TxOutcome::Failed(VaultError::RolledBack(name.to_string()))
            }
            (Err(Abort::Fail(err)), _) => {
                self.rollback(name);
                debug!(scope = name, error = %err, "transaction failed");
                TxOutcome::Failed(err)
            }
        }
    }

    fn mark_doomed(&self, doom: Doom) {
        // a failure outranks a cancel
        if self.doom.get() != Some(Doom::Failed) {
            self.doom.set(Some(doom));
        }
    }

    fn rollback(&self, name: &str) {
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            warn!(scope = name, error = %err, "rollback failed");
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("depth", &self.depth.get())
            .finish()
    }
}

/// Closes a scope even when its body unwinds
struct ScopeGuard<'a> {
    store: &'a Store,
    outermost: bool,
    completed: bool,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.store.depth.set(self.store.depth.get() - 1);
        if self.completed {
            return;
        }
        if self.outermost {
            self.store.doom.set(None);
            self.store.rollback("unwind");
        } else {
            self.store.mark_doomed(Doom::Failed);
        }
    }
}
