//! Credential records and their repository

mod fields;
mod repository;
mod types;

pub use fields::{Field, FieldCapabilities, FieldSpec, FIELDS};
pub use repository::CredentialRepository;
pub use types::{ChangeEvent, CredentialRecord};
