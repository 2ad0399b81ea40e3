//! Schema descriptors and the process-wide model registry.
//!
//! # Responsibility
//! - Turn a model's table definition into an immutable [`Schema`].
//! - Keep exactly one descriptor per model type for the process lifetime.
//!
//! # Invariants
//! - A registered descriptor never changes; re-registration returns the
//!   existing one.
//! - Declaration problems surface as [`DeclarationError`] before any record
//!   of the model exists.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod descriptor;
pub mod registry;

pub use descriptor::{ColumnSpec, Schema};

/// Model declaration failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    MissingTable {
        entity: String,
    },
    MissingPrimaryKey {
        entity: String,
    },
    MultiplePrimaryKeys {
        entity: String,
        columns: Vec<String>,
    },
    DuplicateColumn {
        entity: String,
        column: String,
    },
    InvalidIdentifier {
        entity: String,
        identifier: String,
    },
    UnknownEncryptedColumn {
        entity: String,
        column: String,
    },
    InvalidEncryptionKey {
        entity: String,
        column: String,
        message: String,
    },
    /// The model's `preprocess` hook did not hand back a mapping.
    PreprocessReturnedNothing {
        entity: String,
    },
}

impl Display for DeclarationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTable { entity } => write!(
                f,
                "{entity} must have a table definition declared at the model level"
            ),
            Self::MissingPrimaryKey { entity } => {
                write!(f, "the model `{entity}` declares no primary key column")
            }
            Self::MultiplePrimaryKeys { entity, columns } => write!(
                f,
                "the model `{entity}` declares more than one primary key: {}",
                columns.join(", ")
            ),
            Self::DuplicateColumn { entity, column } => {
                write!(f, "the model `{entity}` declares column `{column}` twice")
            }
            Self::InvalidIdentifier { entity, identifier } => write!(
                f,
                "the model `{entity}` uses invalid SQL identifier `{identifier}`"
            ),
            Self::UnknownEncryptedColumn { entity, column } => write!(
                f,
                "the model `{entity}` enrolls unknown column `{column}` for encryption"
            ),
            Self::InvalidEncryptionKey {
                entity,
                column,
                message,
            } => write!(
                f,
                "the model `{entity}` has an invalid key for `{column}`: {message}"
            ),
            Self::PreprocessReturnedNothing { entity } => write!(
                f,
                "The model `{entity}` declares a preprocess method but it does not return a dictionary!"
            ),
        }
    }
}

impl Error for DeclarationError {}
