//! SQLite reference backend.
//!
//! # Responsibility
//! - Render compiled queries as SQL with positional binds.
//! - Report stored rows for writes through `RETURNING *`.
//!
//! # Invariants
//! - Identifiers are always quoted; values are always bound, never inlined.
//! - `LIKE` predicates use `ESCAPE '#'`.
//! - An in-memory engine serializes callers on one shared connection.

use super::open::{open_db, open_db_in_memory};
use super::{Backend, Connection, DbError, DbResult, ResultCursor, Row};
use crate::config::EngineOptions;
use crate::model::table::quote_ident;
use crate::model::value::{format_decimal, format_timestamp, Value};
use crate::query::{CompareOp, CountQuery, Direction, Expr, Query, LIKE_ESCAPE};
use log::debug;
use rust_decimal::Decimal;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Statement, ToSql};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub(crate) const MEMORY_URI: &str = "sqlite::memory:";
pub(crate) const FILE_URI_PREFIX: &str = "sqlite://";

enum Storage {
    Memory(Mutex<rusqlite::Connection>),
    File(PathBuf),
}

/// SQLite engine backend.
pub struct SqliteBackend {
    uri: String,
    options: EngineOptions,
    storage: Storage,
}

impl SqliteBackend {
    /// Opens one private in-memory database shared by every connect call.
    pub fn memory(options: EngineOptions) -> DbResult<Self> {
        let conn = open_db_in_memory(&options)?;
        Ok(Self {
            uri: MEMORY_URI.to_string(),
            options,
            storage: Storage::Memory(Mutex::new(conn)),
        })
    }

    /// File database; each connect call opens a fresh connection.
    pub fn file(path: impl AsRef<Path>, options: EngineOptions) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            uri: format!("{FILE_URI_PREFIX}{}", path.display()),
            options,
            storage: Storage::File(path),
        }
    }
}

impl Backend for SqliteBackend {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn connect(&self) -> DbResult<Box<dyn Connection + '_>> {
        let session = match &self.storage {
            Storage::Memory(shared) => {
                Session::Shared(shared.lock().map_err(|_| DbError::ConnectionPoisoned)?)
            }
            Storage::File(path) => Session::Owned(open_db(path, &self.options)?),
        };
        Ok(Box::new(SqliteConnection { session }))
    }
}

enum Session<'a> {
    Owned(rusqlite::Connection),
    Shared(MutexGuard<'a, rusqlite::Connection>),
}

impl Deref for Session<'_> {
    type Target = rusqlite::Connection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(conn) => conn,
            Self::Shared(guard) => &**guard,
        }
    }
}

/// One acquired SQLite connection.
pub struct SqliteConnection<'a> {
    session: Session<'a>,
}

impl Connection for SqliteConnection<'_> {
    fn execute(&mut self, query: &Query) -> DbResult<ResultCursor> {
        let (sql, binds) = render_select(query);
        let mut stmt = self.session.prepare(&sql)?;
        let cursor = read_rows(&mut stmt, &binds)?;
        debug!(
            "event=query_execute module=db table={} rows={}",
            query.table,
            cursor.row_count()
        );
        Ok(cursor)
    }

    fn count(&mut self, query: &CountQuery) -> DbResult<i64> {
        let mut sql = format!(
            "SELECT COUNT({}) FROM {}",
            quote_ident(&query.column),
            quote_ident(&query.table)
        );
        let mut binds = Vec::new();
        push_where(&query.predicates, &mut sql, &mut binds);

        let total = self
            .session
            .query_row(&sql, params_from_iter(binds.iter()), |row| row.get(0))?;
        Ok(total)
    }

    fn insert(&mut self, table: &str, values: &[(String, Value)]) -> DbResult<Row> {
        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quote_ident(table))
        } else {
            let columns = values
                .iter()
                .map(|(name, _)| quote_ident(name))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = vec!["?"; values.len()].join(", ");
            format!(
                "INSERT INTO {} ({columns}) VALUES ({placeholders}) RETURNING *",
                quote_ident(table)
            )
        };
        let binds: Vec<&Value> = values.iter().map(|(_, value)| value).collect();

        let mut stmt = self.session.prepare(&sql)?;
        let mut cursor = read_rows(&mut stmt, &binds)?;
        cursor
            .fetch_one_row()
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    fn update(
        &mut self,
        table: &str,
        key: (&str, &Value),
        values: &[(String, Value)],
    ) -> DbResult<Option<Row>> {
        let (key_column, key_value) = key;
        let sql = if values.is_empty() {
            format!(
                "SELECT * FROM {} WHERE {} = ?",
                quote_ident(table),
                quote_ident(key_column)
            )
        } else {
            let assignments = values
                .iter()
                .map(|(name, _)| format!("{} = ?", quote_ident(name)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "UPDATE {} SET {assignments} WHERE {} = ? RETURNING *",
                quote_ident(table),
                quote_ident(key_column)
            )
        };
        let mut binds: Vec<&Value> = values.iter().map(|(_, value)| value).collect();
        binds.push(key_value);

        let mut stmt = self.session.prepare(&sql)?;
        let mut cursor = read_rows(&mut stmt, &binds)?;
        Ok(cursor.fetch_one_row())
    }

    fn delete(&mut self, table: &str, key: (&str, &Value)) -> DbResult<usize> {
        let (key_column, key_value) = key;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(table),
            quote_ident(key_column)
        );
        let removed = self.session.execute(&sql, [key_value])?;
        Ok(removed)
    }

    fn execute_batch(&mut self, sql: &str) -> DbResult<()> {
        self.session.execute_batch(sql)?;
        Ok(())
    }

    fn table_columns(&mut self, table: &str) -> DbResult<Vec<String>> {
        let mut stmt = self
            .session
            .prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
        let mut rows = stmt.query([])?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            columns.push(row.get::<_, String>(1)?);
        }
        Ok(columns)
    }
}

fn read_rows<V: ToSql>(stmt: &mut Statement<'_>, binds: &[V]) -> DbResult<ResultCursor> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query(params_from_iter(binds.iter()))?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            record.push(row.get::<_, Value>(index)?);
        }
        values.push(record);
    }
    Ok(ResultCursor::new(columns, values))
}

fn render_select(query: &Query) -> (String, Vec<Value>) {
    let columns = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query
            .columns
            .iter()
            .map(|name| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut sql = format!("SELECT {columns} FROM {}", quote_ident(&query.table));
    let mut binds = Vec::new();
    push_where(&query.predicates, &mut sql, &mut binds);

    if !query.order_by.is_empty() {
        let terms = query
            .order_by
            .iter()
            .map(|term| {
                let direction = match term.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                format!("{} {direction}", quote_ident(&term.column))
            })
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms);
    }

    match (query.limit, query.offset) {
        (Some(limit), offset) => {
            sql.push_str(" LIMIT ?");
            binds.push(Value::Integer(clamp_i64(limit)));
            if let Some(offset) = offset {
                sql.push_str(" OFFSET ?");
                binds.push(Value::Integer(clamp_i64(offset)));
            }
        }
        (None, Some(offset)) => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(Value::Integer(clamp_i64(offset)));
        }
        (None, None) => {}
    }

    (sql, binds)
}

fn push_where(predicates: &[Expr], sql: &mut String, binds: &mut Vec<Value>) {
    if predicates.is_empty() {
        return;
    }
    let rendered = predicates
        .iter()
        .map(|predicate| render_expr(predicate, binds))
        .collect::<Vec<_>>()
        .join(" AND ");
    sql.push_str(" WHERE ");
    sql.push_str(&rendered);
}

fn render_expr(expr: &Expr, binds: &mut Vec<Value>) -> String {
    match expr {
        Expr::Compare { column, op, value } => {
            let column = quote_ident(column);
            match (op, value) {
                (CompareOp::Eq, Value::Null) => format!("{column} IS NULL"),
                (CompareOp::Ne, Value::Null) => format!("{column} IS NOT NULL"),
                _ => {
                    binds.push(value.clone());
                    format!("{column} {} ?", op.as_sql())
                }
            }
        }
        Expr::Like { column, pattern } => {
            binds.push(Value::Text(pattern.clone()));
            format!("{} LIKE ? ESCAPE '{LIKE_ESCAPE}'", quote_ident(column))
        }
        Expr::IsNull { column, negated } => {
            let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
            format!("{} {keyword}", quote_ident(column))
        }
        Expr::In { column, values } => {
            if values.is_empty() {
                return "0".to_string();
            }
            binds.extend(values.iter().cloned());
            format!(
                "{} IN ({})",
                quote_ident(column),
                vec!["?"; values.len()].join(", ")
            )
        }
        Expr::And(items) => render_group(items, " AND ", "1", binds),
        Expr::Or(items) => render_group(items, " OR ", "0", binds),
        Expr::Not(inner) => format!("NOT ({})", render_expr(inner, binds)),
    }
}

fn render_group(items: &[Expr], separator: &str, empty: &str, binds: &mut Vec<Value>) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    let parts = items
        .iter()
        .map(|item| render_expr(item, binds))
        .collect::<Vec<_>>()
        .join(separator);
    format!("({parts})")
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as SqlValue;

        Ok(match self {
            Self::Null => ToSqlOutput::Owned(SqlValue::Null),
            Self::Integer(number) => ToSqlOutput::Owned(SqlValue::Integer(*number)),
            Self::Decimal(decimal) => ToSqlOutput::Owned(SqlValue::Text(format_decimal(*decimal))),
            Self::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
            Self::Boolean(flag) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*flag))),
            Self::Timestamp(timestamp) => {
                ToSqlOutput::Owned(SqlValue::Text(format_timestamp(*timestamp)))
            }
            Self::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(number) => Self::Integer(number),
            ValueRef::Real(real) => Decimal::try_from(real)
                .map(Self::Decimal)
                .map_err(|err| FromSqlError::Other(Box::new(err)))?,
            ValueRef::Text(_) => Self::Text(value.as_str()?.to_string()),
            ValueRef::Blob(bytes) => Self::Blob(bytes.to_vec()),
        })
    }
}
