//! Query representation and the predicate expression builder.

use crate::model::value::Value;
use std::ops::Not;

/// Escape character used by every `LIKE` predicate.
pub const LIKE_ESCAPE: char = '#';

/// Comparison operator of a [`Expr::Compare`] predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Boolean predicate over columns of one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    /// `LIKE` with [`LIKE_ESCAPE`]; `pattern` is already escaped.
    Like { column: String, pattern: String },
    IsNull { column: String, negated: bool },
    In { column: String, values: Vec<Value> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn and(self, other: Expr) -> Expr {
        match self {
            Self::And(mut items) => {
                items.push(other);
                Self::And(items)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Expr) -> Expr {
        match self {
            Self::Or(mut items) => {
                items.push(other);
                Self::Or(items)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Every column referenced by this expression.
    pub fn columns(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_columns(&mut names);
        names
    }

    fn collect_columns<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Compare { column, .. }
            | Self::Like { column, .. }
            | Self::IsNull { column, .. }
            | Self::In { column, .. } => names.push(column.as_str()),
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_columns(names);
                }
            }
            Self::Not(inner) => inner.collect_columns(names),
        }
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

/// Column handle used to build predicates: `col("age").gt(18)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef(String);

/// Starts a predicate on `name`.
pub fn col(name: impl Into<String>) -> ColumnRef {
    ColumnRef(name.into())
}

impl ColumnRef {
    pub fn name(&self) -> &str {
        &self.0
    }

    fn compare(&self, op: CompareOp, value: impl Into<Value>) -> Expr {
        Expr::Compare {
            column: self.0.clone(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(&self, value: impl Into<Value>) -> Expr {
        self.compare(CompareOp::Ge, value)
    }

    /// Prefix match; pattern characters in `value` match literally.
    pub fn starts_with(&self, value: impl Into<Value>) -> Expr {
        let text = value.into().to_text().unwrap_or_default();
        Expr::Like {
            column: self.0.clone(),
            pattern: format!("{}%", escape_like(&text)),
        }
    }

    /// Substring match; pattern characters in `value` match literally.
    pub fn contains(&self, value: impl Into<Value>) -> Expr {
        let text = value.into().to_text().unwrap_or_default();
        Expr::Like {
            column: self.0.clone(),
            pattern: format!("%{}%", escape_like(&text)),
        }
    }

    pub fn is_null(&self) -> Expr {
        Expr::IsNull {
            column: self.0.clone(),
            negated: false,
        }
    }

    pub fn is_not_null(&self) -> Expr {
        Expr::IsNull {
            column: self.0.clone(),
            negated: true,
        }
    }

    pub fn is_in<I, V>(&self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expr::In {
            column: self.0.clone(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn asc(&self) -> OrderBy {
        OrderBy::asc(self.0.clone())
    }

    pub fn desc(&self) -> OrderBy {
        OrderBy::desc(self.0.clone())
    }
}

/// Escapes `#`, `%`, `_` and `/` with [`LIKE_ESCAPE`].
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, LIKE_ESCAPE | '%' | '_' | '/') {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Compiled row-fetch query.
///
/// Immutable once compiled; safe to reuse and log.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: Vec<String>,
    /// Conjunction of predicates.
    pub predicates: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    /// Same query restricted to at most `limit` rows unless already limited.
    pub fn limited_to(mut self, limit: u64) -> Self {
        if self.limit.is_none() {
            self.limit = Some(limit);
        }
        self
    }
}

/// Compiled counting query.
#[derive(Debug, Clone, PartialEq)]
pub struct CountQuery {
    pub table: String,
    pub column: String,
    pub predicates: Vec<Expr>,
}
