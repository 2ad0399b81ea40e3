//! Persistence manager and per-model shortcuts.
//!
//! # Responsibility
//! - Run compiled queries on one engine and map rows back into records.
//! - Implement insert-or-update, delete and refresh with lifecycle hooks.
//!
//! # Invariants
//! - Validation and engine resolution finish before a connection is opened.
//! - A connection is released before any hook runs.
//! - Lookups report absence as `None` / empty vectors, never as errors.

use crate::db::registry::{default_engine, get_or_create_engine};
use crate::db::{Engine, ResultCursor};
use crate::error::{OrmError, OrmResult};
use crate::model::fields::Fields;
use crate::model::record::{Model, Record};
use crate::model::table::generate_token;
use crate::query::{
    col, compile, compile_count, compile_where, Expr, OrderBy, Query, QueryOptions,
};
use crate::schema::{registry, Schema};
use log::{debug, error};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Persistence façade for model `M` on one engine.
pub struct Manager<M: Model> {
    engine: Engine,
    schema: Arc<Schema>,
    marker: PhantomData<fn() -> M>,
}

impl<M: Model> std::fmt::Debug for Manager<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("entity", &self.schema.entity())
            .field("engine", &self.engine)
            .finish()
    }
}

impl<M: Model> Manager<M> {
    /// # Errors
    /// - `Declaration` when `M` is not a valid model.
    pub fn new(engine: Engine) -> OrmResult<Self> {
        Ok(Self {
            engine,
            schema: registry::resolve::<M>()?,
            marker: PhantomData,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Creates the backing table unless it exists.
    pub fn create_table(&self) -> OrmResult<()> {
        self.engine.create_table(self.schema.table())?;
        Ok(())
    }

    /// Verifies the backing table carries every declared column.
    pub fn ensure_table_ready(&self) -> OrmResult<()> {
        self.engine.ensure_table_ready(self.schema.table())?;
        Ok(())
    }

    /// Builds a record bound to this manager's engine and saves it.
    ///
    /// An auto-token column missing from `data` gets a fresh token.
    pub fn create(&self, mut data: Fields) -> OrmResult<Record<M>> {
        if let Some(column) = self.schema.auto_token_column() {
            if !data.contains(column) {
                data.insert(column, generate_token());
            }
        }
        let mut record = Record::with_engine(self.engine.clone(), data)?;
        save_with(&mut record, &self.engine)?;
        Ok(record)
    }

    /// Returns the first record matching `data`, creating one on a miss.
    ///
    /// Lookup and create are separate statements; a concurrent creator can
    /// win in between, which surfaces as a constraint violation when the
    /// table enforces uniqueness.
    pub fn get_or_create(&self, data: Fields) -> OrmResult<Record<M>> {
        match self.find_one_by(&data)? {
            Some(record) => Ok(record),
            None => self.create(data),
        }
    }

    /// Runs a keyword query and returns the raw cursor.
    pub fn query_by(&self, filters: &Fields, options: &QueryOptions) -> OrmResult<ResultCursor> {
        let query = compile(&self.schema, filters, options)?;
        self.query(&query)
    }

    /// Runs a compiled query and returns the raw cursor.
    pub fn query(&self, query: &Query) -> OrmResult<ResultCursor> {
        let mut conn = self.engine.connect()?;
        Ok(conn.execute(query)?)
    }

    pub fn find_one_by(&self, filters: &Fields) -> OrmResult<Option<Record<M>>> {
        self.find_one_by_with(filters, &QueryOptions::default())
    }

    pub fn find_one_by_with(
        &self,
        filters: &Fields,
        options: &QueryOptions,
    ) -> OrmResult<Option<Record<M>>> {
        let query = compile(&self.schema, filters, options)?.limited_to(1);
        self.one_from_query(&query)
    }

    pub fn find_by(&self, filters: &Fields) -> OrmResult<Vec<Record<M>>> {
        self.find_by_with(filters, &QueryOptions::default())
    }

    pub fn find_by_with(
        &self,
        filters: &Fields,
        options: &QueryOptions,
    ) -> OrmResult<Vec<Record<M>>> {
        let query = compile(&self.schema, filters, options)?;
        self.many_from_query(&query)
    }

    /// Every row, ordered and paginated by `options`.
    pub fn all(&self, options: &QueryOptions) -> OrmResult<Vec<Record<M>>> {
        self.find_by_with(&Fields::new(), options)
    }

    /// Counts non-null `field_name` values (primary key by default) among
    /// rows matching `filters`. Unknown filter keys are skipped.
    pub fn total_rows(&self, field_name: Option<&str>, filters: &Fields) -> OrmResult<i64> {
        let query = compile_count(&self.schema, field_name, filters)?;
        let mut conn = self.engine.connect()?;
        Ok(conn.count(&query)?)
    }

    /// Records matching every expression; unordered unless `order_by` is set.
    pub fn where_many(
        &self,
        expressions: Vec<Expr>,
        order_by: Option<Vec<OrderBy>>,
    ) -> OrmResult<Vec<Record<M>>> {
        let query = compile_where(&self.schema, expressions, order_by)?;
        self.many_from_query(&query)
    }

    pub fn where_one(
        &self,
        expressions: Vec<Expr>,
        order_by: Option<Vec<OrderBy>>,
    ) -> OrmResult<Option<Record<M>>> {
        let query = compile_where(&self.schema, expressions, order_by)?;
        self.one_from_query(&query)
    }

    pub fn many_from_query(&self, query: &Query) -> OrmResult<Vec<Record<M>>> {
        let mut cursor = self.query(query)?;
        cursor
            .fetch_all_rows()
            .into_iter()
            .map(|row| Record::from_row(self.engine.clone(), row))
            .collect()
    }

    pub fn one_from_query(&self, query: &Query) -> OrmResult<Option<Record<M>>> {
        let mut cursor = self.query(query)?;
        cursor
            .fetch_one_row()
            .map(|row| Record::from_row(self.engine.clone(), row))
            .transpose()
    }

    /// Saves `record` through its bound engine, else this manager's.
    pub fn save(&self, record: &mut Record<M>) -> OrmResult<()> {
        let engine = record.resolve_engine(None, Some(&self.engine))?;
        save_with(record, &engine)
    }

    pub fn delete(&self, record: &Record<M>) -> OrmResult<usize> {
        let engine = record.resolve_engine(None, Some(&self.engine))?;
        delete_with(record, &engine)
    }

    pub fn refresh(&self, record: &mut Record<M>) -> OrmResult<()> {
        let engine = record.resolve_engine(None, Some(&self.engine))?;
        refresh_with(record, &engine)
    }
}

/// Inserts when the primary key is unset, updates otherwise, then folds the
/// stored row back into `record`.
pub(crate) fn save_with<M: Model>(record: &mut Record<M>, engine: &Engine) -> OrmResult<()> {
    M::before_save(record)?;

    let started_at = Instant::now();
    let schema = record.shared_schema();
    let table = schema.table_name();
    let pk_value = record.pk_value();
    let params = record.to_insert_params()?;
    let operation = if pk_value.is_null() { "insert" } else { "update" };

    let outcome = engine.connect().and_then(|mut conn| {
        if pk_value.is_null() {
            // Unset columns are left out so server-side defaults apply.
            let values: Vec<_> = params
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect();
            conn.insert(table, &values).map(Some)
        } else {
            conn.update(table, (schema.primary_key(), &pk_value), &params)
        }
    });

    let row = match outcome {
        Ok(Some(row)) => row,
        Ok(None) => {
            return Err(OrmError::RecordNotFound {
                entity: schema.entity().to_string(),
                primary_key: pk_value,
            })
        }
        Err(err) => {
            error!(
                "event=record_save module=repo status=error entity={} op={} uri={} duration_ms={} error={}",
                schema.entity(),
                operation,
                engine.uri(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    record.adopt_row(row)?;
    debug!(
        "event=record_save module=repo status=ok entity={} op={} duration_ms={}",
        schema.entity(),
        operation,
        started_at.elapsed().as_millis()
    );

    M::after_save(record)
}

pub(crate) fn delete_with<M: Model>(record: &Record<M>, engine: &Engine) -> OrmResult<usize> {
    M::before_delete(record)?;

    let removed = {
        let mut conn = engine.connect()?;
        conn.delete(
            record.schema().table_name(),
            (record.pk_name(), &record.pk_value()),
        )?
    };
    debug!(
        "event=record_delete module=repo status=ok entity={} removed={}",
        record.schema().entity(),
        removed
    );

    M::after_delete(record)?;
    Ok(removed)
}

pub(crate) fn refresh_with<M: Model>(record: &mut Record<M>, engine: &Engine) -> OrmResult<()> {
    let pk_value = record.pk_value();
    let not_found = || OrmError::RecordNotFound {
        entity: record.schema().entity().to_string(),
        primary_key: pk_value.clone(),
    };
    if pk_value.is_null() {
        return Err(not_found());
    }

    let query = compile_where(
        record.schema(),
        vec![col(record.pk_name()).eq(pk_value.clone())],
        None,
    )?
    .limited_to(1);
    let row = {
        let mut conn = engine.connect()?;
        conn.execute(&query)?.fetch_one_row()
    };
    let row = row.ok_or_else(not_found)?;
    record.replace_fields(row)
}

/// Model-level shortcuts, available on every [`Model`].
///
/// `objects()` and the shortcuts resolve the registry's default engine.
pub trait ActiveRecord: Model {
    fn using(engine: &Engine) -> OrmResult<Manager<Self>> {
        Manager::new(engine.clone())
    }

    /// Manager on the engine registered for `uri`, created on first use.
    fn using_uri(uri: &str) -> OrmResult<Manager<Self>> {
        Manager::new(get_or_create_engine(uri, None)?)
    }

    /// # Errors
    /// - `EngineNotSpecified` when no engine is registered.
    fn objects() -> OrmResult<Manager<Self>> {
        let engine = default_engine().ok_or_else(|| OrmError::EngineNotSpecified {
            entity: Self::entity_name().to_string(),
        })?;
        Manager::new(engine)
    }

    fn create(data: Fields) -> OrmResult<Record<Self>> {
        Self::objects()?.create(data)
    }

    fn get_or_create(data: Fields) -> OrmResult<Record<Self>> {
        Self::objects()?.get_or_create(data)
    }

    fn find_one_by(filters: &Fields) -> OrmResult<Option<Record<Self>>> {
        Self::objects()?.find_one_by(filters)
    }

    fn find_by(filters: &Fields) -> OrmResult<Vec<Record<Self>>> {
        Self::objects()?.find_by(filters)
    }

    fn all(options: &QueryOptions) -> OrmResult<Vec<Record<Self>>> {
        Self::objects()?.all(options)
    }

    fn total_rows(field_name: Option<&str>, filters: &Fields) -> OrmResult<i64> {
        Self::objects()?.total_rows(field_name, filters)
    }

    fn where_many(
        expressions: Vec<Expr>,
        order_by: Option<Vec<OrderBy>>,
    ) -> OrmResult<Vec<Record<Self>>> {
        Self::objects()?.where_many(expressions, order_by)
    }

    fn where_one(
        expressions: Vec<Expr>,
        order_by: Option<Vec<OrderBy>>,
    ) -> OrmResult<Option<Record<Self>>> {
        Self::objects()?.where_one(expressions, order_by)
    }
}

impl<M: Model> ActiveRecord for M {}
