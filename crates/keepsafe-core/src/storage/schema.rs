//! Table layout and master-password row I/O

use rusqlite::{params, Connection, Row};

use super::Store;
use crate::crypto::{HashParams, KdfParams};
use crate::error::Result;

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS credentials (
    name     TEXT PRIMARY KEY,
    email    TEXT NOT NULL DEFAULT '',
    password BLOB NOT NULL,
    website  TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS master_password (
    hashed_password BLOB NOT NULL,
    kdf_iterations  INTEGER NOT NULL,
    memory_cost     INTEGER NOT NULL,
    time_cost       INTEGER NOT NULL,
    parallelism     INTEGER NOT NULL
);
";

pub(crate) fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_TABLES)
}

/// The master-password row
///
/// Both parameter sets travel with the hash: every stored credential is
/// encrypted under `kdf_params`, whatever the settings file says later.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterHashRow {
    /// `salt || hash`
    pub hashed_password: Vec<u8>,
    /// Argon2id parameters the hash was computed with
    pub hash_params: HashParams,
    /// PBKDF2 parameters of the field cipher
    pub kdf_params: KdfParams,
}

impl MasterHashRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            hashed_password: row.get(0)?,
            kdf_params: KdfParams {
                iterations: row.get(1)?,
            },
            hash_params: HashParams {
                memory_cost: row.get(2)?,
                time_cost: row.get(3)?,
                parallelism: row.get(4)?,
            },
        })
    }
}

impl std::fmt::Debug for MasterHashRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterHashRow")
            .field("hashed_password", &"[REDACTED]")
            .field("hash_params", &self.hash_params)
            .field("kdf_params", &self.kdf_params)
            .finish()
    }
}

/// Read the master-password row, if a master password was ever set
pub fn load_master_hash(store: &Store) -> Result<Option<MasterHashRow>> {
    store.fetch_optional(
        "SELECT hashed_password, kdf_iterations, memory_cost, time_cost, parallelism
         FROM master_password LIMIT 1",
        [],
        MasterHashRow::from_row,
    )
}

/// Replace the master-password row; the table never holds more than one
pub fn save_master_hash(store: &Store, row: &MasterHashRow) -> Result<()> {
    store.execute("DELETE FROM master_password", [])?;
    store.execute(
        "INSERT INTO master_password
         (hashed_password, kdf_iterations, memory_cost, time_cost, parallelism)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            row.hashed_password,
            row.kdf_params.iterations,
            row.hash_params.memory_cost,
            row.hash_params.time_cost,
            row.hash_params.parallelism,
        ],
    )?;
    Ok(())
}
