//! Relational connection collaborator and its SQLite implementation.
//!
//! # Responsibility
//! - Define the narrow `Backend`/`Connection` interface the persistence
//!   manager runs compiled queries through.
//! - Provide the cloneable [`Engine`] handle records and managers carry.
//! - Ship a reference backend on SQLite.
//!
//! # Invariants
//! - Every manager operation acquires one connection, runs one statement
//!   and drops the connection.
//! - Backend failures are surfaced as [`DbError`] unchanged; nothing here
//!   retries.

use crate::config::EngineOptions;
use crate::model::table::Table;
use crate::model::value::Value;
use crate::query::{CountQuery, Query};
use log::info;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use std::sync::Arc;

mod open;
pub mod registry;
mod sqlite;

pub use open::{open_db, open_db_in_memory};
pub use sqlite::SqliteBackend;

pub type DbResult<T> = Result<T, DbError>;

/// Column name/value pairs of one row, in backend column order.
pub type Row = Vec<(String, Value)>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Engine URI with an unknown scheme or empty path.
    InvalidUri(String),
    /// A shared connection was poisoned by a panic in another caller.
    ConnectionPoisoned,
    MissingTable(String),
    MissingColumn {
        table: String,
        column: String,
    },
}

impl DbError {
    /// Returns whether the backend rejected a write on a constraint
    /// (unique, not-null, foreign key, check).
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidUri(uri) => write!(f, "unsupported engine uri `{uri}`"),
            Self::ConnectionPoisoned => write!(f, "shared connection is poisoned"),
            Self::MissingTable(table) => write!(f, "required table `{table}` does not exist"),
            Self::MissingColumn { table, column } => {
                write!(f, "required column `{column}` is missing from table `{table}`")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidUri(_)
            | Self::ConnectionPoisoned
            | Self::MissingTable(_)
            | Self::MissingColumn { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Buffered rows of one executed query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultCursor {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
}

impl ResultCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows not fetched yet.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Takes the next row, positionally aligned with [`Self::column_names`].
    pub fn fetch_one(&mut self) -> Option<Vec<Value>> {
        self.rows.pop_front()
    }

    /// Takes every remaining row.
    pub fn fetch_all(&mut self) -> Vec<Vec<Value>> {
        self.rows.drain(..).collect()
    }

    /// Like [`Self::fetch_one`], with values paired to their column names.
    pub fn fetch_one_row(&mut self) -> Option<Row> {
        let values = self.fetch_one()?;
        Some(self.pair(values))
    }

    pub fn fetch_all_rows(&mut self) -> Vec<Row> {
        self.fetch_all()
            .into_iter()
            .map(|values| self.pair(values))
            .collect()
    }

    fn pair(&self, values: Vec<Value>) -> Row {
        self.columns.iter().cloned().zip(values).collect()
    }
}

/// One live connection to a relational backend.
pub trait Connection {
    fn execute(&mut self, query: &Query) -> DbResult<ResultCursor>;

    /// Counts non-null values of the query column among matching rows.
    fn count(&mut self, query: &CountQuery) -> DbResult<i64>;

    /// Inserts one row and reports the stored row, including backend
    /// assigned keys and server defaults.
    fn insert(&mut self, table: &str, values: &[(String, Value)]) -> DbResult<Row>;

    /// Updates the row keyed by `key` and reports the stored row, or `None`
    /// when no row carries that key.
    fn update(
        &mut self,
        table: &str,
        key: (&str, &Value),
        values: &[(String, Value)],
    ) -> DbResult<Option<Row>>;

    /// Deletes the row keyed by `key`; returns the number of removed rows.
    fn delete(&mut self, table: &str, key: (&str, &Value)) -> DbResult<usize>;

    /// Runs raw DDL.
    fn execute_batch(&mut self, sql: &str) -> DbResult<()>;

    /// Column names of `table`, empty when the table does not exist.
    fn table_columns(&mut self, table: &str) -> DbResult<Vec<String>>;
}

/// Source of connections (pool, file, shared in-memory database).
pub trait Backend: Send + Sync {
    fn uri(&self) -> &str;

    fn connect(&self) -> DbResult<Box<dyn Connection + '_>>;
}

/// Cloneable engine handle; clones share one backend.
#[derive(Clone)]
pub struct Engine {
    backend: Arc<dyn Backend>,
}

impl Engine {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Engine over a SQLite file, created on first connect.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self::sqlite_with_options(path, EngineOptions::default())
    }

    pub fn sqlite_with_options(path: impl AsRef<Path>, options: EngineOptions) -> Self {
        Self::new(SqliteBackend::file(path, options))
    }

    /// Engine over one private in-memory SQLite database.
    pub fn sqlite_in_memory() -> DbResult<Self> {
        Self::sqlite_in_memory_with_options(EngineOptions::default())
    }

    pub fn sqlite_in_memory_with_options(options: EngineOptions) -> DbResult<Self> {
        Ok(Self::new(SqliteBackend::memory(options)?))
    }

    /// Builds an engine from `sqlite::memory:` or `sqlite://<path>`.
    ///
    /// # Errors
    /// - `InvalidUri` for other schemes or an empty path.
    pub fn from_uri(uri: &str) -> DbResult<Self> {
        Self::from_uri_with_options(uri, EngineOptions::default())
    }

    pub fn from_uri_with_options(uri: &str, options: EngineOptions) -> DbResult<Self> {
        let uri = uri.trim();
        if uri == sqlite::MEMORY_URI {
            return Self::sqlite_in_memory_with_options(options);
        }
        match uri.strip_prefix(sqlite::FILE_URI_PREFIX) {
            Some(path) if !path.is_empty() => Ok(Self::sqlite_with_options(path, options)),
            _ => Err(DbError::InvalidUri(uri.to_string())),
        }
    }

    pub fn uri(&self) -> &str {
        self.backend.uri()
    }

    pub fn connect(&self) -> DbResult<Box<dyn Connection + '_>> {
        self.backend.connect()
    }

    /// Returns whether both handles share one backend.
    pub fn same_as(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.backend, &other.backend)
    }

    /// Creates `table` unless it already exists.
    pub fn create_table(&self, table: &Table) -> DbResult<()> {
        let mut conn = self.connect()?;
        conn.execute_batch(&table.create_sql())?;
        info!(
            "event=table_create module=db status=ok table={}",
            table.name
        );
        Ok(())
    }

    /// Verifies that `table` exists and carries every declared column.
    ///
    /// # Errors
    /// - `MissingTable` / `MissingColumn` naming the first gap found.
    pub fn ensure_table_ready(&self, table: &Table) -> DbResult<()> {
        let mut conn = self.connect()?;
        let existing = conn.table_columns(&table.name)?;
        if existing.is_empty() {
            return Err(DbError::MissingTable(table.name.clone()));
        }
        for column in &table.columns {
            if !existing.iter().any(|name| name == &column.name) {
                return Err(DbError::MissingColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Debug for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("uri", &self.uri()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{DbError, Engine, ResultCursor};
    use crate::model::table::{Column, ColumnType, Table};
    use crate::model::value::Value;

    #[test]
    fn cursor_yields_rows_in_order() {
        let mut cursor = ResultCursor::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![Value::Integer(2), Value::from("b")],
                vec![Value::Integer(1), Value::from("a")],
            ],
        );
        assert_eq!(cursor.column_names(), ["id", "name"]);
        assert_eq!(
            cursor.fetch_one_row(),
            Some(vec![
                ("id".to_string(), Value::Integer(2)),
                ("name".to_string(), Value::from("b")),
            ])
        );
        assert_eq!(cursor.fetch_all().len(), 1);
        assert_eq!(cursor.fetch_one(), None);
    }

    #[test]
    fn from_uri_accepts_sqlite_schemes_only() {
        let engine = Engine::from_uri("sqlite::memory:").unwrap();
        assert_eq!(engine.uri(), "sqlite::memory:");
        assert!(engine.same_as(&engine.clone()));
        assert!(!engine.same_as(&Engine::sqlite_in_memory().unwrap()));

        let file = Engine::from_uri("sqlite:///tmp/retort-test.sqlite3").unwrap();
        assert_eq!(file.uri(), "sqlite:///tmp/retort-test.sqlite3");

        assert!(matches!(
            Engine::from_uri("postgres://localhost/db"),
            Err(DbError::InvalidUri(_))
        ));
        assert!(matches!(Engine::from_uri("sqlite://"), Err(DbError::InvalidUri(_))));
    }

    #[test]
    fn ensure_table_ready_reports_missing_table_and_column() {
        let engine = Engine::sqlite_in_memory().unwrap();
        let table = Table::new("pets")
            .column(Column::primary_key("id"))
            .column(Column::new("name", ColumnType::Text));

        let err = engine.ensure_table_ready(&table).unwrap_err();
        assert!(matches!(err, DbError::MissingTable(ref name) if name == "pets"));

        engine.create_table(&table).unwrap();
        engine.ensure_table_ready(&table).unwrap();
        engine.create_table(&table).unwrap();

        let wider = table.column(Column::new("age", ColumnType::Integer));
        let err = engine.ensure_table_ready(&wider).unwrap_err();
        assert!(matches!(err, DbError::MissingColumn { ref column, .. } if column == "age"));
    }
}
