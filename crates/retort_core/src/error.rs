//! Crate-level error taxonomy.
//!
//! # Responsibility
//! - Group declaration, validation, coercion, engine-resolution and backend
//!   failures into one result type for record and manager operations.
//!
//! # Invariants
//! - Validation and engine-resolution errors are raised before any I/O.
//! - Backend failures are carried opaquely as [`DbError`]; nothing is
//!   retried or translated.

use crate::codec::FieldTypeError;
use crate::db::DbError;
use crate::model::value::Value;
use crate::query::QueryError;
use crate::schema::{DeclarationError, Schema};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type OrmResult<T> = Result<T, OrmError>;

/// Error for record, codec and manager operations.
#[derive(Debug)]
pub enum OrmError {
    Declaration(DeclarationError),
    /// A field name that the model does not declare.
    InvalidColumnName {
        entity: String,
        column: String,
        available: Vec<String>,
    },
    Query(QueryError),
    FieldType(FieldTypeError),
    Encryption {
        entity: String,
        column: String,
    },
    EngineNotSpecified {
        entity: String,
    },
    MultipleEnginesSpecified {
        entity: String,
    },
    RecordNotFound {
        entity: String,
        primary_key: Value,
    },
    Db(DbError),
}

impl OrmError {
    pub(crate) fn invalid_column(schema: &Schema, column: &str) -> Self {
        Self::InvalidColumnName {
            entity: schema.entity().to_string(),
            column: column.to_string(),
            available: schema.sorted_column_names(),
        }
    }

    /// Returns whether the backend rejected a write on a constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_constraint_violation())
    }
}

impl Display for OrmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declaration(err) => write!(f, "{err}"),
            Self::InvalidColumnName {
                entity,
                column,
                available,
            } => write!(
                f,
                "{column} is not a valid column name for the model {entity} ([{}])",
                available.join(", ")
            ),
            Self::Query(err) => write!(f, "{err}"),
            Self::FieldType(err) => write!(f, "{err}"),
            Self::Encryption { entity, column } => {
                write!(f, "failed to encrypt {entity}.{column}")
            }
            Self::EngineNotSpecified { entity } => write!(
                f,
                "an engine is required to run operations on this {entity} record"
            ),
            Self::MultipleEnginesSpecified { entity } => write!(
                f,
                "this {entity} record is already bound to an engine; it may not be persisted through another one"
            ),
            Self::RecordNotFound {
                entity,
                primary_key,
            } => write!(f, "{entity} record not found: {primary_key}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OrmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Declaration(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::FieldType(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidColumnName { .. }
            | Self::Encryption { .. }
            | Self::EngineNotSpecified { .. }
            | Self::MultipleEnginesSpecified { .. }
            | Self::RecordNotFound { .. } => None,
        }
    }
}

impl From<DeclarationError> for OrmError {
    fn from(value: DeclarationError) -> Self {
        Self::Declaration(value)
    }
}

impl From<QueryError> for OrmError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<FieldTypeError> for OrmError {
    fn from(value: FieldTypeError) -> Self {
        Self::FieldType(value)
    }
}

impl From<DbError> for OrmError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for OrmError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
