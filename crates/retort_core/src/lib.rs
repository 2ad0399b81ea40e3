//! Active-record persistence layer over a relational store.
//! Models declare their table once; records validate, coerce and persist
//! their fields through one schema descriptor per model type.

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod fixture;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod schema;

pub use codec::cipher::Keyring;
pub use codec::FieldTypeError;
pub use config::EngineOptions;
pub use db::registry::{
    clear_engines, default_engine, get_or_create_engine, register_engine, set_default_engine,
};
pub use db::{Backend, Connection, DbError, DbResult, Engine, ResultCursor, Row};
pub use error::{OrmError, OrmResult};
pub use fixture::{Factory, FactoryError, FactorySet};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::fields::{Fields, Input};
pub use model::record::{Model, Record};
pub use model::table::{Column, ColumnDefault, ColumnType, Table};
pub use model::value::{Value, ValueKind};
pub use query::{col, Expr, OrderBy, Query, QueryError, QueryOptions};
pub use repo::{ActiveRecord, Manager};
pub use schema::{DeclarationError, Schema};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
