//! Keyword filter compiler.
//!
//! A filter key is either a column name (equality) or `column__modifier`
//! where the modifier is `startswith` or `contains`.

use crate::codec::filter_operand;
use crate::model::fields::Fields;
use crate::model::value::Value;
use crate::query::expr::{col, CountQuery, Expr, OrderBy, Query};
use crate::query::QueryError;
use crate::schema::Schema;
use log::debug;

const MODIFIER_SEPARATOR: &str = "__";

/// Ordering and pagination options for keyword queries.
///
/// `order_by` is a column name optionally prefixed with `+` (ascending) or
/// `-` (descending). An unprefixed name sorts descending. Negative `limit`
/// and `offset` values are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, spec: impl Into<String>) -> Self {
        self.order_by = Some(spec.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Compiles keyword filters into a fully ordered row query.
///
/// # Errors
/// - `InvalidColumnName` for an unknown column (with or without modifier).
/// - `InvalidQueryModifier` for a modifier other than `startswith`/`contains`.
/// - `InvalidFilterValue` when a value cannot be cast to its column's kind.
pub fn compile(schema: &Schema, filters: &Fields, options: &QueryOptions) -> Result<Query, QueryError> {
    let mut predicates = Vec::with_capacity(filters.len());
    for (key, input) in filters.iter() {
        predicates.push(filter_predicate(schema, key, input.resolve())?);
    }

    let order = parse_order(schema, options.order_by.as_deref())?;

    Ok(Query {
        table: schema.table_name().to_string(),
        columns: schema.column_names().map(str::to_string).collect(),
        predicates,
        order_by: vec![order],
        limit: non_negative("limit", options.limit),
        offset: non_negative("offset", options.offset),
    })
}

/// Compiles a counting query.
///
/// Filters naming unknown columns or modifiers are skipped; `field_name`
/// must name a declared column and defaults to the primary key.
///
/// # Errors
/// - `InvalidColumnName` when `field_name` is not a declared column.
/// - `InvalidFilterValue` when a value cannot be cast to its column's kind.
pub fn compile_count(
    schema: &Schema,
    field_name: Option<&str>,
    filters: &Fields,
) -> Result<CountQuery, QueryError> {
    let column = field_name.unwrap_or_else(|| schema.primary_key());
    ensure_column(schema, column)?;

    let mut predicates = Vec::with_capacity(filters.len());
    for (key, input) in filters.iter() {
        match filter_predicate(schema, key, input.resolve()) {
            Ok(predicate) => predicates.push(predicate),
            Err(err @ QueryError::InvalidFilterValue { .. }) => return Err(err),
            Err(err) => {
                debug!(
                    "event=count_filter_skipped module=query table={} key={} reason={:?}",
                    schema.table_name(),
                    key,
                    err.to_string()
                );
            }
        }
    }

    Ok(CountQuery {
        table: schema.table_name().to_string(),
        column: column.to_string(),
        predicates,
    })
}

/// Builds a row query from pre-built expressions.
///
/// No default order is applied; without `order_by` the backend decides.
///
/// # Errors
/// - `InvalidColumnName` when an expression or ordering term references an
///   undeclared column.
pub fn compile_where(
    schema: &Schema,
    expressions: Vec<Expr>,
    order_by: Option<Vec<OrderBy>>,
) -> Result<Query, QueryError> {
    for expression in &expressions {
        for column in expression.columns() {
            ensure_column(schema, column)?;
        }
    }
    let order_by = order_by.unwrap_or_default();
    for term in &order_by {
        ensure_column(schema, &term.column)?;
    }

    Ok(Query {
        table: schema.table_name().to_string(),
        columns: schema.column_names().map(str::to_string).collect(),
        predicates: expressions,
        order_by,
        limit: None,
        offset: None,
    })
}

/// Parses an ordering spec (`name`, `+name`, `-name`).
///
/// `None` or a blank spec orders by descending primary key.
pub fn parse_order(schema: &Schema, spec: Option<&str>) -> Result<OrderBy, QueryError> {
    let spec = spec.map(str::trim).unwrap_or_default();
    if spec.is_empty() {
        return Ok(OrderBy::desc(schema.primary_key()));
    }

    let (ascending, column) = match spec.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, spec.strip_prefix('-').unwrap_or(spec)),
    };
    ensure_column(schema, column)?;

    Ok(if ascending {
        OrderBy::asc(column)
    } else {
        OrderBy::desc(column)
    })
}

fn filter_predicate(schema: &Schema, key: &str, value: Value) -> Result<Expr, QueryError> {
    if schema.has_column(key) {
        return Ok(col(key).eq(stored_operand(schema, key, value)?));
    }

    let Some((column, modifier)) = key.split_once(MODIFIER_SEPARATOR) else {
        return Err(invalid_column(schema, key));
    };
    ensure_column(schema, column)?;

    match modifier {
        "startswith" => Ok(col(column).starts_with(pattern_operand(schema, column, value)?)),
        "contains" => Ok(col(column).contains(pattern_operand(schema, column, value)?)),
        _ => Err(QueryError::InvalidQueryModifier {
            column: column.to_string(),
            modifier: modifier.to_string(),
        }),
    }
}

fn stored_operand(schema: &Schema, column: &str, value: Value) -> Result<Value, QueryError> {
    filter_operand(schema, column, value).map_err(|err| QueryError::InvalidFilterValue {
        entity: err.entity,
        column: err.column,
        message: err.message,
    })
}

/// Text fragments match stored text as given; a prefix such as `"2"` must
/// not be widened to `"2.00"`. Typed operands are rendered in stored form.
fn pattern_operand(schema: &Schema, column: &str, value: Value) -> Result<Value, QueryError> {
    if matches!(value, Value::Text(_)) {
        return Ok(value);
    }
    Ok(match stored_operand(schema, column, value)? {
        Value::Boolean(flag) => Value::Integer(i64::from(flag)),
        other => other,
    })
}

fn ensure_column(schema: &Schema, column: &str) -> Result<(), QueryError> {
    if schema.has_column(column) {
        Ok(())
    } else {
        Err(invalid_column(schema, column))
    }
}

fn invalid_column(schema: &Schema, column: &str) -> QueryError {
    QueryError::InvalidColumnName {
        entity: schema.entity().to_string(),
        column: column.to_string(),
    }
}

fn non_negative(name: &str, value: Option<i64>) -> Option<u64> {
    let value = value?;
    match u64::try_from(value) {
        Ok(value) => Some(value),
        Err(_) => {
            debug!("event=query_option_ignored module=query option={name} value={value}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compile, compile_count, compile_where, parse_order, QueryOptions};
    use crate::codec::cipher::Keyring;
    use crate::fields;
    use crate::codec::filter_operand;
use crate::model::fields::Fields;
    use crate::model::table::{Column, ColumnType, Table};
    use crate::model::value::Value;
    use crate::query::{col, Direction, Expr, OrderBy, QueryError};
    use crate::schema::Schema;

    fn schema() -> Schema {
        let table = Table::new("dummy_user_model")
            .column(Column::primary_key("id"))
            .column(Column::new("name", ColumnType::String(80)))
            .column(Column::new("age", ColumnType::Integer));
        Schema::build("DummyUser", table, &Keyring::new()).unwrap()
    }

    fn priced_schema() -> Schema {
        let table = Table::new("priced_item")
            .column(Column::primary_key("id"))
            .column(Column::new("price", ColumnType::Numeric).default_value("9.99"))
            .column(Column::new("active", ColumnType::Boolean));
        Schema::build("PricedItem", table, &Keyring::new()).unwrap()
    }

    #[test]
    fn compile_builds_equality_and_like_predicates() {
        let query = compile(
            &schema(),
            &fields! { "name__contains" => "oc", "age" => 25_i64 },
            &QueryOptions::new(),
        )
        .unwrap();

        assert_eq!(query.table, "dummy_user_model");
        assert_eq!(query.columns, vec!["id", "name", "age"]);
        assert_eq!(
            query.predicates,
            vec![
                Expr::Like {
                    column: "name".to_string(),
                    pattern: "%oc%".to_string(),
                },
                col("age").eq(25_i64),
            ]
        );
        assert_eq!(query.order_by, vec![OrderBy::desc("id")]);
        assert_eq!((query.limit, query.offset), (None, None));
    }

    #[test]
    fn filter_values_are_rendered_in_stored_form() {
        let schema = priced_schema();
        let query = compile(
            &schema,
            &fields! { "price" => 2_i64, "active" => "yes" },
            &QueryOptions::new(),
        )
        .unwrap();
        assert_eq!(
            query.predicates,
            vec![col("price").eq("2.00"), col("active").eq(true)]
        );

        let query = compile(&schema, &fields! { "price" => Value::Null }, &QueryOptions::new())
            .unwrap();
        assert_eq!(query.predicates, vec![col("price").eq(Value::Null)]);

        let query = compile(
            &schema,
            &fields! { "price__startswith" => "2", "active__contains" => true },
            &QueryOptions::new(),
        )
        .unwrap();
        assert_eq!(
            query.predicates,
            vec![
                Expr::Like {
                    column: "price".to_string(),
                    pattern: "2%".to_string(),
                },
                Expr::Like {
                    column: "active".to_string(),
                    pattern: "%1%".to_string(),
                },
            ]
        );
    }

    #[test]
    fn uncastable_filter_values_name_the_column() {
        let err = compile(&schema(), &fields! { "age" => "old" }, &QueryOptions::new())
            .unwrap_err();
        match err {
            QueryError::InvalidFilterValue { entity, column, message } => {
                assert_eq!(entity, "DummyUser");
                assert_eq!(column, "age");
                assert!(message.contains("old"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = compile_count(&schema(), None, &fields! { "age" => "old" }).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilterValue { .. }));
    }

    #[test]
    fn compile_resolves_lazy_filter_values() {
        let filters = Fields::new().with_lazy("age", || Value::Integer(3));
        let query = compile(&schema(), &filters, &QueryOptions::new()).unwrap();
        assert_eq!(query.predicates, vec![col("age").eq(3_i64)]);
    }

    #[test]
    fn compile_rejects_unknown_columns_and_modifiers() {
        let err = compile(&schema(), &fields! { "nickname" => "x" }, &QueryOptions::new())
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidColumnName { ref column, .. } if column == "nickname"));

        let err = compile(&schema(), &fields! { "nick__contains" => "x" }, &QueryOptions::new())
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidColumnName { ref column, .. } if column == "nick"));

        let err = compile(&schema(), &fields! { "name__endswith" => "x" }, &QueryOptions::new())
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidQueryModifier {
                column: "name".to_string(),
                modifier: "endswith".to_string(),
            }
        );
    }

    #[test]
    fn parse_order_handles_prefixes() {
        let schema = schema();
        assert_eq!(parse_order(&schema, None).unwrap(), OrderBy::desc("id"));
        assert_eq!(parse_order(&schema, Some("")).unwrap(), OrderBy::desc("id"));
        assert_eq!(parse_order(&schema, Some("+name")).unwrap(), OrderBy::asc("name"));
        assert_eq!(parse_order(&schema, Some("-name")).unwrap(), OrderBy::desc("name"));
        assert_eq!(
            parse_order(&schema, Some("age")).unwrap().direction,
            Direction::Desc
        );
        assert!(parse_order(&schema, Some("+nickname")).is_err());
    }

    #[test]
    fn negative_pagination_is_ignored() {
        let options = QueryOptions::new().limit(-1).offset(-5);
        let query = compile(&schema(), &Fields::new(), &options).unwrap();
        assert_eq!((query.limit, query.offset), (None, None));

        let options = QueryOptions::new().limit(10).offset(0);
        let query = compile(&schema(), &Fields::new(), &options).unwrap();
        assert_eq!((query.limit, query.offset), (Some(10), Some(0)));
    }

    #[test]
    fn compile_count_skips_unknown_filters() {
        let count = compile_count(
            &schema(),
            None,
            &fields! { "name" => "a", "nickname" => "b", "age__gt" => 1_i64 },
        )
        .unwrap();
        assert_eq!(count.column, "id");
        assert_eq!(count.predicates, vec![col("name").eq("a")]);

        let err = compile_count(&schema(), Some("nickname"), &Fields::new()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidColumnName { .. }));
    }

    #[test]
    fn compile_where_validates_columns() {
        let query = compile_where(
            &schema(),
            vec![col("age").ge(18_i64)],
            Some(vec![OrderBy::asc("name")]),
        )
        .unwrap();
        assert_eq!(query.order_by, vec![OrderBy::asc("name")]);

        let err = compile_where(&schema(), vec![col("nickname").eq("x")], None).unwrap_err();
        assert!(matches!(err, QueryError::InvalidColumnName { .. }));
        let err = compile_where(&schema(), Vec::new(), Some(vec![OrderBy::desc("zzz")]))
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidColumnName { .. }));
    }
}
