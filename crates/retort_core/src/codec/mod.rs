//! Value coercion between in-memory fields and their storage form.
//!
//! # Responsibility
//! - Apply column defaults and cast values to their column's logical kind.
//! - Render wire text for decimals and timestamps.
//! - Seal/open encrypted columns.
//!
//! # Invariants
//! - Every conversion is scoped to one column of one [`crate::Schema`].
//! - A failed cast is always reported with entity and column context.
//! - A value that fails to decrypt is treated as plain, never as an error.

use crate::model::value::ValueKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod cipher;
pub mod pipeline;

pub use pipeline::{cast, decrypt, deserialize, encode, encrypt, filter_operand, serialize};

/// A value could not be cast to its column's logical kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTypeError {
    pub entity: String,
    pub column: String,
    pub expected: ValueKind,
    pub message: String,
}

impl Display for FieldTypeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} value type error: {}",
            self.entity, self.column, self.message
        )
    }
}

impl Error for FieldTypeError {}
