//! Active-record instances and the model capability trait.
//!
//! # Responsibility
//! - Let a model type declare its table, encryption keys and lifecycle hooks.
//! - Own one instance's field values and route every mutation through the
//!   codec pipeline.
//!
//! # Invariants
//! - A record only ever holds declared columns.
//! - Stored values are always in deserialized (in-memory) form.
//! - Persisted records compare by primary key, unsaved ones by content.

use crate::codec::{self, cipher::Keyring};
use crate::db::{Engine, Row};
use crate::error::{OrmError, OrmResult};
use crate::model::fields::{Fields, Input};
use crate::model::table::Table;
use crate::model::value::Value;
use crate::repo::manager;
use crate::schema::{registry, DeclarationError, Schema};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

/// Declaration and lifecycle hooks of one model type.
///
/// Every hook has a no-op default; only [`Model::table`] must be provided
/// for the type to be usable.
///
/// ```
/// use retort_core::{Column, ColumnType, Model, Table};
///
/// struct User;
///
/// impl Model for User {
///     fn table() -> Option<Table> {
///         Some(
///             Table::new("user")
///                 .column(Column::primary_key("id"))
///                 .column(Column::new("name", ColumnType::String(80))),
///         )
///     }
/// }
/// ```
pub trait Model: Sized + 'static {
    /// Backing table; `None` marks an abstract model that cannot be built.
    fn table() -> Option<Table> {
        None
    }

    /// Short name used in representations; generic arguments are dropped
    /// (`Wrapper<foo::Bar>` -> `Wrapper`).
    fn entity_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Encryption keys per column.
    fn encryption() -> Keyring {
        Keyring::new()
    }

    /// Rewrites construction input; returning `None` fails construction.
    fn preprocess(data: Fields) -> Option<Fields> {
        Some(data)
    }

    /// Runs at the end of every construction.
    fn initialize(_record: &mut Record<Self>) -> OrmResult<()> {
        Ok(())
    }

    fn before_save(_record: &mut Record<Self>) -> OrmResult<()> {
        Ok(())
    }

    fn after_save(_record: &Record<Self>) -> OrmResult<()> {
        Ok(())
    }

    fn before_delete(_record: &Record<Self>) -> OrmResult<()> {
        Ok(())
    }

    fn after_delete(_record: &Record<Self>) -> OrmResult<()> {
        Ok(())
    }
}

/// One instance of model `M`.
pub struct Record<M: Model> {
    schema: Arc<Schema>,
    fields: BTreeMap<String, Value>,
    engine: Option<Engine>,
    marker: PhantomData<fn() -> M>,
}

impl<M: Model> Record<M> {
    /// Builds an unbound record from keyword data.
    ///
    /// # Errors
    /// - `Declaration` when `M` is not a valid model or `preprocess` fails.
    /// - `InvalidColumnName` for a key `M` does not declare.
    pub fn new(data: Fields) -> OrmResult<Self> {
        Self::build(None, data)
    }

    /// Builds a record bound to `engine`.
    pub fn with_engine(engine: Engine, data: Fields) -> OrmResult<Self> {
        Self::build(Some(engine), data)
    }

    fn build(engine: Option<Engine>, data: Fields) -> OrmResult<Self> {
        let schema = registry::resolve::<M>()?;
        let data = M::preprocess(data).ok_or_else(|| {
            DeclarationError::PreprocessReturnedNothing {
                entity: schema.entity().to_string(),
            }
        })?;

        let mut record = Self {
            schema,
            fields: BTreeMap::new(),
            engine,
            marker: PhantomData,
        };
        record.set_many(data)?;
        M::initialize(&mut record)?;
        Ok(record)
    }

    pub(crate) fn from_row(engine: Engine, row: Row) -> OrmResult<Self> {
        Self::with_engine(engine, row.into_iter().collect())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn shared_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    /// Sets one field through the deserialize pipeline.
    ///
    /// # Errors
    /// - `InvalidColumnName` when `name` is not declared.
    pub fn set(&mut self, name: &str, input: impl Into<Input>) -> OrmResult<&mut Self> {
        if !self.schema.has_column(name) {
            return Err(OrmError::invalid_column(&self.schema, name));
        }
        let value = codec::deserialize(&self.schema, name, input.into().resolve())?;
        self.fields.insert(name.to_string(), value);
        Ok(self)
    }

    /// Sets several fields; nothing is assigned when any name is unknown.
    pub fn set_many(&mut self, data: Fields) -> OrmResult<&mut Self> {
        if let Some(unknown) = data.names().find(|name| !self.schema.has_column(name)) {
            return Err(OrmError::invalid_column(&self.schema, unknown));
        }
        for (name, input) in data {
            self.set(&name, input)?;
        }
        Ok(self)
    }

    /// Stored value of `name`, `None` when never assigned.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_or(&self, name: &str, fallback: impl Into<Value>) -> Value {
        self.fields
            .get(name)
            .cloned()
            .unwrap_or_else(|| fallback.into())
    }

    /// Value of `name` with the column default applied and cast to the
    /// column kind.
    pub fn value(&self, name: &str) -> OrmResult<Value> {
        let stored = self.fields.get(name).cloned().unwrap_or_default();
        codec::cast(&self.schema, name, &stored)
    }

    /// Assigned fields in name order.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn pk_name(&self) -> &str {
        self.schema.primary_key()
    }

    pub fn pk_value(&self) -> Value {
        self.fields
            .get(self.schema.primary_key())
            .cloned()
            .unwrap_or_default()
    }

    /// Returns whether the primary key is set. No I/O is performed.
    pub fn is_persisted(&self) -> bool {
        !self.pk_value().is_null()
    }

    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    pub fn set_engine(&mut self, engine: Option<Engine>) {
        self.engine = engine;
    }

    /// Serialized snapshot of every declared column, defaults applied.
    pub fn to_dict(&self) -> OrmResult<BTreeMap<String, Value>> {
        let mut snapshot = BTreeMap::new();
        for column in self.schema.column_names() {
            let stored = self.fields.get(column).cloned().unwrap_or_default();
            snapshot.insert(
                column.to_string(),
                codec::serialize(&self.schema, column, &stored)?,
            );
        }
        Ok(snapshot)
    }

    /// [`Self::to_dict`] rendered as JSON with sorted keys.
    pub fn to_json(&self) -> OrmResult<String> {
        Ok(self.to_json_value()?.to_string())
    }

    pub fn to_json_pretty(&self) -> OrmResult<String> {
        Ok(format!("{:#}", self.to_json_value()?))
    }

    fn to_json_value(&self) -> OrmResult<serde_json::Value> {
        let object = self
            .to_dict()?
            .into_iter()
            .map(|(name, value)| (name, value.to_json()))
            .collect();
        Ok(serde_json::Value::Object(object))
    }

    /// Storage form of every non primary key column, encrypted where
    /// enrolled, in declaration order.
    pub fn to_insert_params(&self) -> OrmResult<Vec<(String, Value)>> {
        let pk = self.schema.primary_key();
        let mut params = Vec::with_capacity(self.schema.columns().len());
        for column in self.schema.column_names().filter(|column| *column != pk) {
            let stored = self.fields.get(column).cloned().unwrap_or_default();
            params.push((
                column.to_string(),
                codec::encode(&self.schema, column, &stored)?,
            ));
        }
        Ok(params)
    }

    /// Inserts or updates this record.
    ///
    /// Uses the bound engine or `engine`, never both.
    ///
    /// # Errors
    /// - `MultipleEnginesSpecified` / `EngineNotSpecified` before any I/O.
    /// - `RecordNotFound` when updating a row that no longer exists.
    pub fn save(&mut self, engine: Option<&Engine>) -> OrmResult<&mut Self> {
        let engine = self.resolve_engine(engine, None)?;
        manager::save_with(self, &engine)?;
        Ok(self)
    }

    /// Deletes the row keyed by this record's primary key.
    pub fn delete(&self, engine: Option<&Engine>) -> OrmResult<usize> {
        let engine = self.resolve_engine(engine, None)?;
        manager::delete_with(self, &engine)
    }

    /// Reloads every field from the stored row; unsaved changes are lost.
    pub fn refresh(&mut self) -> OrmResult<&mut Self> {
        let engine = self.resolve_engine(None, None)?;
        manager::refresh_with(self, &engine)?;
        Ok(self)
    }

    /// [`Self::set_many`] followed by [`Self::save`] on the bound engine.
    pub fn update_and_save(&mut self, data: Fields) -> OrmResult<&mut Self> {
        self.set_many(data)?;
        self.save(None)
    }

    /// Picks the one authoritative engine: bound, supplied, then fallback.
    pub(crate) fn resolve_engine(
        &self,
        supplied: Option<&Engine>,
        fallback: Option<&Engine>,
    ) -> OrmResult<Engine> {
        match (self.engine.as_ref(), supplied) {
            (Some(_), Some(_)) => Err(OrmError::MultipleEnginesSpecified {
                entity: self.schema.entity().to_string(),
            }),
            (Some(engine), None) | (None, Some(engine)) => Ok(engine.clone()),
            (None, None) => fallback.cloned().ok_or_else(|| OrmError::EngineNotSpecified {
                entity: self.schema.entity().to_string(),
            }),
        }
    }

    /// Folds a backend-reported row into this record.
    pub(crate) fn adopt_row(&mut self, row: Row) -> OrmResult<()> {
        for (name, value) in row {
            if self.schema.has_column(&name) {
                let value = codec::deserialize(&self.schema, &name, value)?;
                self.fields.insert(name, value);
            }
        }
        Ok(())
    }

    pub(crate) fn replace_fields(&mut self, row: Row) -> OrmResult<()> {
        self.fields.clear();
        self.adopt_row(row)
    }
}

impl<M: Model> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            fields: self.fields.clone(),
            engine: self.engine.clone(),
            marker: PhantomData,
        }
    }
}

impl<M: Model> PartialEq for Record<M> {
    fn eq(&self, other: &Self) -> bool {
        let pk = self.schema.primary_key();
        let (mine, theirs) = (self.pk_value(), other.pk_value());
        if !mine.is_null() && !theirs.is_null() {
            return mine == theirs;
        }

        let names: BTreeSet<&String> = self.fields.keys().chain(other.fields.keys()).collect();
        names
            .into_iter()
            .filter(|name| name.as_str() != pk)
            .all(|name| {
                let left = self.fields.get(name).unwrap_or(&Value::Null);
                let right = other.fields.get(name).unwrap_or(&Value::Null);
                left == right
            })
    }
}

impl<M: Model> Display for Record<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{} {}={}>",
            self.schema.entity(),
            self.pk_name(),
            self.pk_value()
        )
    }
}

impl<M: Model> Debug for Record<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("entity", &self.schema.entity())
            .field("fields", &self.fields)
            .field("engine", &self.engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Model, Record};
    use crate::db::Engine;
    use crate::error::OrmError;
    use crate::fields;
    use crate::model::fields::Fields;
    use crate::model::table::{Column, ColumnType, Table};
    use crate::model::value::Value;
    use crate::schema::DeclarationError;

    struct DummyUser;

    impl Model for DummyUser {
        fn table() -> Option<Table> {
            Some(
                Table::new("dummy_user_model")
                    .column(Column::primary_key("id"))
                    .column(Column::new("name", ColumnType::String(80)))
                    .column(Column::new("age", ColumnType::Integer)),
            )
        }
    }

    struct Tagged<T>(std::marker::PhantomData<T>);

    impl<T: 'static> Model for Tagged<T> {}

    struct Sluggish;

    impl Model for Sluggish {
        fn table() -> Option<Table> {
            Some(
                Table::new("sluggish")
                    .column(Column::primary_key("id"))
                    .column(Column::new("title", ColumnType::Text))
                    .column(Column::new("slug", ColumnType::Text)),
            )
        }

        fn preprocess(mut data: Fields) -> Option<Fields> {
            let title = data.get("title")?.resolve().to_text()?;
            data.insert("slug", title.to_lowercase().replace(' ', "-"));
            Some(data)
        }
    }

    #[test]
    fn construction_deserializes_and_keeps_values() {
        let user = Record::<DummyUser>::new(fields! { "name" => "Gabriel", "age" => 25_i64 })
            .unwrap();
        assert_eq!(user.get("name"), Some(&Value::from("Gabriel")));
        assert_eq!(user.get("age"), Some(&Value::Integer(25)));
        assert!(!user.is_persisted());
        assert_eq!(user.to_string(), "<DummyUser id=None>");
    }

    #[test]
    fn unknown_column_names_field_and_model() {
        let err = Record::<DummyUser>::new(fields! { "foo" => "bar" }).unwrap_err();
        match &err {
            OrmError::InvalidColumnName { column, entity, .. } => {
                assert_eq!(column, "foo");
                assert_eq!(entity, "DummyUser");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().ends_with("([age, id, name])"));
    }

    #[test]
    fn entity_name_drops_module_path_and_generics() {
        assert_eq!(DummyUser::entity_name(), "DummyUser");
        assert_eq!(Tagged::<DummyUser>::entity_name(), "Tagged");
        assert_eq!(Tagged::<Vec<Option<String>>>::entity_name(), "Tagged");
    }

    #[test]
    fn set_many_is_all_or_nothing() {
        let mut user = Record::<DummyUser>::new(fields! { "name" => "a" }).unwrap();
        let err = user
            .set_many(fields! { "name" => "b", "nickname" => "c" })
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidColumnName { .. }));
        assert_eq!(user.get("name"), Some(&Value::from("a")));
    }

    #[test]
    fn lazy_inputs_are_resolved_on_set() {
        let user = Record::<DummyUser>::new(Fields::new().with_lazy("age", || Value::Integer(9)))
            .unwrap();
        assert_eq!(user.get("age"), Some(&Value::Integer(9)));
    }

    #[test]
    fn preprocess_can_derive_and_reject_input() {
        let post = Record::<Sluggish>::new(fields! { "title" => "Hello World" }).unwrap();
        assert_eq!(post.get("slug"), Some(&Value::from("hello-world")));

        let err = Record::<Sluggish>::new(Fields::new()).unwrap_err();
        assert!(matches!(
            err,
            OrmError::Declaration(DeclarationError::PreprocessReturnedNothing { .. })
        ));
    }

    #[test]
    fn value_casts_stored_text() {
        let user = Record::<DummyUser>::new(fields! { "age" => "25" }).unwrap();
        assert_eq!(user.get("age"), Some(&Value::from("25")));
        assert_eq!(user.value("age").unwrap(), Value::Integer(25));
        assert_eq!(user.get_or("name", "anonymous"), Value::from("anonymous"));
    }

    #[test]
    fn equality_uses_primary_key_when_both_are_set() {
        let a = Record::<DummyUser>::new(fields! { "id" => 1_i64, "name" => "a" }).unwrap();
        let b = Record::<DummyUser>::new(fields! { "id" => 1_i64, "name" => "b" }).unwrap();
        let c = Record::<DummyUser>::new(fields! { "id" => 2_i64, "name" => "a" }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn equality_falls_back_to_content_without_primary_key() {
        let a = Record::<DummyUser>::new(fields! { "name" => "a", "age" => 3_i64 }).unwrap();
        let b = Record::<DummyUser>::new(fields! { "id" => 7_i64, "name" => "a", "age" => 3_i64 })
            .unwrap();
        let c = Record::<DummyUser>::new(fields! { "name" => "a" }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn to_dict_and_json_cover_every_column() {
        let user = Record::<DummyUser>::new(fields! { "name" => "Gabriel", "age" => "25" })
            .unwrap();
        let dict = user.to_dict().unwrap();
        assert_eq!(dict.len(), 3);
        assert_eq!(dict["age"], Value::Integer(25));
        assert_eq!(dict["id"], Value::Null);

        let json: serde_json::Value = serde_json::from_str(&user.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "age": 25, "id": null, "name": "Gabriel" })
        );
        assert!(user.to_json_pretty().unwrap().contains('\n'));
    }

    #[test]
    fn to_insert_params_skip_primary_key() {
        let user = Record::<DummyUser>::new(fields! { "id" => 4_i64, "name" => "x" }).unwrap();
        let params = user.to_insert_params().unwrap();
        assert_eq!(
            params,
            vec![
                ("name".to_string(), Value::from("x")),
                ("age".to_string(), Value::Null),
            ]
        );
    }

    #[test]
    fn engine_resolution_rejects_ambiguity() {
        let engine = Engine::sqlite_in_memory().unwrap();
        let mut unbound = Record::<DummyUser>::new(fields! { "name" => "x" }).unwrap();
        assert!(matches!(
            unbound.save(None).unwrap_err(),
            OrmError::EngineNotSpecified { .. }
        ));

        let mut bound = Record::<DummyUser>::with_engine(engine.clone(), fields! { "name" => "x" })
            .unwrap();
        assert!(matches!(
            bound.save(Some(&engine)).unwrap_err(),
            OrmError::MultipleEnginesSpecified { .. }
        ));
        assert!(unbound.resolve_engine(None, Some(&engine)).unwrap().same_as(&engine));
    }
}
