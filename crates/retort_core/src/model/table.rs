//! Relational table definitions.
//!
//! # Responsibility
//! - Let each model declare its backing table once (name, ordered columns,
//!   column types, keys, defaults).
//! - Derive logical value kinds and DDL from column types.
//!
//! # Invariants
//! - Column logical kinds come only from `ColumnType`; there is no second
//!   type-declaration surface.
//! - Definitions are plain data; validation happens at schema registration.

use crate::model::value::{Value, ValueKind};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Storage type of one column as declared in the table definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInteger,
    /// Fixed-point number, stored as two-digit text.
    Numeric,
    /// Bounded text, length is informational only.
    String(u32),
    Text,
    Boolean,
    DateTime,
    Date,
    Binary,
}

impl ColumnType {
    /// Logical kind derived from this storage type.
    pub fn logical_kind(self) -> ValueKind {
        match self {
            Self::Integer | Self::BigInteger => ValueKind::Integer,
            Self::Numeric => ValueKind::Decimal,
            Self::String(_) | Self::Text => ValueKind::Text,
            Self::Boolean => ValueKind::Boolean,
            Self::DateTime | Self::Date => ValueKind::Timestamp,
            Self::Binary => ValueKind::Binary,
        }
    }

    /// SQL type used in `CREATE TABLE`.
    pub fn sql_type(self) -> String {
        match self {
            Self::Integer | Self::BigInteger => "INTEGER".to_string(),
            Self::Numeric => "TEXT".to_string(),
            Self::String(length) => format!("VARCHAR({length})"),
            Self::Text => "TEXT".to_string(),
            Self::Boolean => "BOOLEAN".to_string(),
            Self::DateTime => "DATETIME".to_string(),
            Self::Date => "DATE".to_string(),
            Self::Binary => "BLOB".to_string(),
        }
    }
}

/// Zero-argument value generator used for column defaults.
pub type Generator = Arc<dyn Fn() -> Value + Send + Sync>;

/// Client-side default applied when a value is empty at serialization.
#[derive(Clone)]
pub enum ColumnDefault {
    Constant(Value),
    Generated(Generator),
}

impl ColumnDefault {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    pub fn generated(generator: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::Generated(Arc::new(generator))
    }

    /// Produces the default value, invoking the generator if needed.
    pub fn produce(&self) -> Value {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Generated(generator) => generator(),
        }
    }
}

impl Debug for ColumnDefault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

/// One column of a table definition.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
    /// Filled with a fresh 32-hex token by `create` when absent.
    pub auto_token: bool,
    pub default: Option<ColumnDefault>,
    /// Raw SQL default expression evaluated by the backend.
    pub server_default: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            nullable: true,
            unique: false,
            auto_token: false,
            default: None,
            server_default: None,
        }
    }

    /// Integer auto-increment primary key column.
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer).as_primary_key()
    }

    /// 32-character hex token column, defaulted to a fresh UUID.
    pub fn auto_uuid(name: impl Into<String>) -> Self {
        let mut column = Self::new(name, ColumnType::String(32))
            .default_with(|| Value::Text(generate_token()));
        column.auto_token = true;
        column
    }

    pub fn as_primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::constant(value));
        self
    }

    pub fn default_with(mut self, generator: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(ColumnDefault::generated(generator));
        self
    }

    pub fn server_default(mut self, expression: impl Into<String>) -> Self {
        self.server_default = Some(expression.into());
        self
    }

    pub fn kind(&self) -> ValueKind {
        self.column_type.logical_kind()
    }
}

/// Backing table definition of one model.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Renders `CREATE TABLE IF NOT EXISTS` for this definition.
    ///
    /// Identifiers are expected to be validated by schema registration.
    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(column_sql)
            .collect::<Vec<_>>()
            .join(",\n    ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {columns}\n);",
            quote_ident(&self.name)
        )
    }
}

fn column_sql(column: &Column) -> String {
    if column.primary_key && column.column_type.logical_kind() == ValueKind::Integer {
        // INTEGER PRIMARY KEY aliases the rowid, so the backend assigns it.
        return format!("{} INTEGER PRIMARY KEY", quote_ident(&column.name));
    }

    let mut sql = format!("{} {}", quote_ident(&column.name), column.column_type.sql_type());
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
    }
    if !column.nullable && !column.primary_key {
        sql.push_str(" NOT NULL");
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(expression) = column.server_default.as_deref() {
        sql.push_str(&format!(" DEFAULT ({expression})"));
    }
    sql
}

/// Quotes one SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fresh 32-character lowercase hex token.
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}
