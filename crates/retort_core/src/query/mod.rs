//! Predicate and query compilation.
//!
//! # Responsibility
//! - Compile keyword filters (`name`, `name__startswith`, `name__contains`)
//!   plus ordering and pagination into a backend-agnostic [`Query`].
//! - Accept pre-built boolean expressions for callers that need more than
//!   equality/prefix/substring matching.
//!
//! # Invariants
//! - Unknown columns and modifiers are rejected before any connection is
//!   touched (counting queries excepted, see [`compile_count`]).
//! - Keyword queries are always totally ordered; the default is descending
//!   primary key.
//! - Pattern characters in match values are escaped, never interpreted.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod compiler;
mod expr;

pub use compiler::{compile, compile_count, compile_where, parse_order, QueryOptions};
pub use expr::{
    col, escape_like, ColumnRef, CompareOp, CountQuery, Direction, Expr, OrderBy, Query,
    LIKE_ESCAPE,
};

/// Filter compilation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidColumnName { entity: String, column: String },
    InvalidQueryModifier { column: String, modifier: String },
    InvalidFilterValue { entity: String, column: String, message: String },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidColumnName { entity, column } => {
                write!(f, "The field \"{column}\" does not exist in {entity}.")
            }
            Self::InvalidQueryModifier { column, modifier } => write!(
                f,
                "\"{modifier}\" is an invalid query modifier for \"{column}\"."
            ),
            Self::InvalidFilterValue { entity, column, message } => write!(
                f,
                "The filter value for \"{column}\" in {entity} is invalid: {message}"
            ),
        }
    }
}

impl Error for QueryError {}
