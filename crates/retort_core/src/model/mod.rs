//! Model declaration and active-record instances.
//!
//! # Responsibility
//! - Define field values, keyword inputs and table definitions.
//! - Host the [`record::Model`] capability trait and [`record::Record`].
//!
//! # Invariants
//! - Column logical kinds derive from the table definition only.

pub mod fields;
pub mod record;
pub mod table;
pub mod value;
