//! Persistence layer over the connection collaborator.
//!
//! # Responsibility
//! - Map model operations (create, find, count, save, delete, refresh) onto
//!   compiled queries executed through an [`crate::Engine`].
//!
//! # Invariants
//! - Every operation is one logical unit of work on one acquired connection.
//! - Caller errors (unknown columns, ambiguous engines) are raised before
//!   any connection is acquired.

pub mod manager;

pub use manager::{ActiveRecord, Manager};
