//! SQLite persistence for credentials and the master-password hash
//!
//! This module provides:
//! 1. A transactional store with nestable, joinable scopes
//! 2. The fixed table layout and master-password row helpers

mod schema;
mod transaction;

pub use schema::{load_master_hash, save_master_hash, MasterHashRow};
pub use transaction::{Abort, ScopeResult, Store, TxOutcome};
