//! Immutable per-model schema descriptor.

use crate::codec::cipher::{FieldCipher, Keyring};
use crate::model::table::{ColumnDefault, ColumnType, Table};
use crate::model::value::ValueKind;
use crate::schema::DeclarationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Resolved metadata of one column.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ValueKind,
    pub primary_key: bool,
    pub nullable: bool,
    pub auto_token: bool,
    /// Timestamps are stored as a bare `YYYY-MM-DD` date.
    pub date_only: bool,
    pub default: Option<ColumnDefault>,
}

/// Static metadata for one model type.
#[derive(Debug, Clone)]
pub struct Schema {
    entity: String,
    table: Table,
    columns: Vec<ColumnSpec>,
    positions: HashMap<String, usize>,
    primary_key: String,
    ciphers: BTreeMap<String, FieldCipher>,
}

impl Schema {
    /// Builds a descriptor from a table definition and encryption keys.
    ///
    /// # Errors
    /// - Invalid table/column identifiers or duplicate column names.
    /// - Zero or more than one primary key column.
    /// - Keys enrolled for undeclared columns or with a wrong length.
    pub fn build(
        entity: impl Into<String>,
        table: Table,
        keyring: &Keyring,
    ) -> Result<Self, DeclarationError> {
        let entity = entity.into();

        if !IDENTIFIER_RE.is_match(&table.name) {
            return Err(DeclarationError::InvalidIdentifier {
                entity,
                identifier: table.name.clone(),
            });
        }

        let mut columns = Vec::with_capacity(table.columns.len());
        let mut positions = HashMap::with_capacity(table.columns.len());
        for column in &table.columns {
            if !IDENTIFIER_RE.is_match(&column.name) {
                return Err(DeclarationError::InvalidIdentifier {
                    entity,
                    identifier: column.name.clone(),
                });
            }
            if positions.insert(column.name.clone(), columns.len()).is_some() {
                return Err(DeclarationError::DuplicateColumn {
                    entity,
                    column: column.name.clone(),
                });
            }
            columns.push(ColumnSpec {
                name: column.name.clone(),
                kind: column.kind(),
                primary_key: column.primary_key,
                nullable: column.nullable,
                auto_token: column.auto_token,
                date_only: column.column_type == ColumnType::Date,
                default: column.default.clone(),
            });
        }

        let primary_keys: Vec<String> = columns
            .iter()
            .filter(|column| column.primary_key)
            .map(|column| column.name.clone())
            .collect();
        let primary_key = match primary_keys.as_slice() {
            [] => return Err(DeclarationError::MissingPrimaryKey { entity }),
            [single] => single.clone(),
            _ => {
                return Err(DeclarationError::MultiplePrimaryKeys {
                    entity,
                    columns: primary_keys,
                })
            }
        };

        if let Some(column) = keyring
            .columns()
            .find(|column| !positions.contains_key(*column))
        {
            return Err(DeclarationError::UnknownEncryptedColumn {
                entity,
                column: column.to_string(),
            });
        }
        let ciphers = keyring
            .ciphers()
            .map_err(|(column, err)| DeclarationError::InvalidEncryptionKey {
                entity: entity.clone(),
                column,
                message: err.to_string(),
            })?;

        Ok(Self {
            entity,
            table,
            columns,
            positions,
            primary_key,
            ciphers,
        })
    }

    /// Short model name used in representations and error messages (`User`).
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Column names sorted alphabetically, as listed in error messages.
    pub fn sorted_column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.column_names().map(str::to_string).collect();
        names.sort();
        names
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.positions
            .get(name)
            .and_then(|index| self.columns.get(*index))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// First column flagged for token generation by `create`.
    pub fn auto_token_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|column| column.auto_token)
            .map(|column| column.name.as_str())
    }

    pub fn cipher(&self, column: &str) -> Option<&FieldCipher> {
        self.ciphers.get(column)
    }

    pub fn is_encrypted(&self, column: &str) -> bool {
        self.ciphers.contains_key(column)
    }
}

#[cfg(test)]
mod tests {
    use super::Schema;
    use crate::codec::cipher::Keyring;
    use crate::model::table::{Column, ColumnType, Table};
    use crate::model::value::ValueKind;
    use crate::schema::DeclarationError;

    fn user_table() -> Table {
        Table::new("dummy_user_model")
            .column(Column::primary_key("id"))
            .column(Column::new("name", ColumnType::String(80)))
            .column(Column::new("age", ColumnType::Integer))
    }

    #[test]
    fn build_derives_kinds_and_primary_key() {
        let schema = Schema::build("DummyUser", user_table(), &Keyring::new())
            .unwrap();

        assert_eq!(schema.table_name(), "dummy_user_model");
        assert_eq!(schema.primary_key(), "id");
        assert_eq!(schema.column("age").map(|c| c.kind), Some(ValueKind::Integer));
        assert_eq!(schema.sorted_column_names(), vec!["age", "id", "name"]);
        assert!(schema.auto_token_column().is_none());
    }

    #[test]
    fn build_requires_exactly_one_primary_key() {
        let table = Table::new("t").column(Column::new("name", ColumnType::Text));
        let err = Schema::build("T", table, &Keyring::new()).unwrap_err();
        assert!(matches!(err, DeclarationError::MissingPrimaryKey { .. }));

        let table = Table::new("t")
            .column(Column::primary_key("a"))
            .column(Column::primary_key("b"));
        let err = Schema::build("T", table, &Keyring::new()).unwrap_err();
        assert!(matches!(err, DeclarationError::MultiplePrimaryKeys { .. }));
    }

    #[test]
    fn build_rejects_bad_identifiers_and_duplicates() {
        let table = Table::new("bad name").column(Column::primary_key("id"));
        let err = Schema::build("T", table, &Keyring::new()).unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidIdentifier { .. }));

        let table = user_table().column(Column::new("age", ColumnType::Integer));
        let err = Schema::build("T", table, &Keyring::new()).unwrap_err();
        assert_eq!(
            err,
            DeclarationError::DuplicateColumn {
                entity: "T".to_string(),
                column: "age".to_string(),
            }
        );
    }

    #[test]
    fn build_validates_encrypted_columns() {
        let keyring = Keyring::new().with_key("nickname", [1_u8; 32]);
        let err = Schema::build("T", user_table(), &keyring).unwrap_err();
        assert!(matches!(err, DeclarationError::UnknownEncryptedColumn { .. }));

        let keyring = Keyring::new().with_key("name", [1_u8; 32]);
        let schema = Schema::build("T", user_table(), &keyring).unwrap();
        assert!(schema.is_encrypted("name"));
        assert!(!schema.is_encrypted("age"));
    }
}
