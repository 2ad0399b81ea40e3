//! Dynamically-typed field values.
//!
//! # Responsibility
//! - Represent every in-memory and wire value a record field can hold.
//! - Provide canonical text renderings shared by the codec and the SQL
//!   backend (ISO-8601 timestamps, fixed-point decimals).
//!
//! # Invariants
//! - `Value::Null` is the only representation of an absent value.
//! - Decimal and timestamp text renderings are produced by exactly one
//!   function each, so stored text compares equal to bound filter values.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::ser::{Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// Fraction digits used for every rendered decimal.
pub const DECIMAL_FRACTION_DIGITS: u32 = 2;

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const SPACED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Logical value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    Decimal,
    Text,
    Boolean,
    Timestamp,
    Binary,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Binary => "binary",
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Decimal(Decimal),
    Text(String),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Blob(Vec<u8>),
}

impl Value {
    /// Runtime kind, `None` for `Null`.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(ValueKind::Integer),
            Self::Decimal(_) => Some(ValueKind::Decimal),
            Self::Text(_) => Some(ValueKind::Text),
            Self::Boolean(_) => Some(ValueKind::Boolean),
            Self::Timestamp(_) => Some(ValueKind::Timestamp),
            Self::Blob(_) => Some(ValueKind::Binary),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns whether this value counts as missing for defaulting.
    ///
    /// `0` and `false` are real values and never count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.is_empty(),
            Self::Blob(bytes) => bytes.is_empty(),
            _ => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// Text form used when a value is encrypted or cast to text.
    ///
    /// Returns `None` for `Null`; binary values are rendered only when they
    /// are valid UTF-8.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Integer(value) => Some(value.to_string()),
            Self::Decimal(value) => Some(format_decimal(*value)),
            Self::Text(value) => Some(value.clone()),
            Self::Boolean(value) => Some(value.to_string()),
            Self::Timestamp(value) => Some(format_timestamp(*value)),
            Self::Blob(bytes) => String::from_utf8(bytes.clone()).ok(),
        }
    }

    /// Converts a wire value to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(value) => serde_json::Value::from(*value),
            Self::Decimal(value) => serde_json::Value::String(format_decimal(*value)),
            Self::Text(value) => serde_json::Value::String(value.clone()),
            Self::Boolean(value) => serde_json::Value::Bool(*value),
            Self::Timestamp(value) => serde_json::Value::String(format_timestamp(*value)),
            Self::Blob(bytes) => serde_json::Value::Array(
                bytes.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
            other => f.write_str(other.to_text().unwrap_or_default().as_str()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Decimal(value) => serializer.serialize_str(&format_decimal(*value)),
            Self::Text(value) => serializer.serialize_str(value),
            Self::Boolean(value) => serializer.serialize_bool(*value),
            Self::Timestamp(value) => serializer.serialize_str(&format_timestamp(*value)),
            Self::Blob(bytes) => serializer.serialize_bytes(bytes),
        }
    }
}

/// Renders a decimal with two fixed fraction digits (`2.3` -> `2.30`).
pub fn format_decimal(value: Decimal) -> String {
    let rounded = value.round_dp(DECIMAL_FRACTION_DIGITS);
    format!("{rounded:.2}")
}

/// Renders a timestamp as ISO-8601 without offset (`2010-10-10T00:00:00`).
pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(ISO_FORMAT).to_string()
}

/// Renders only the calendar date (`2010-10-10`); used by `Date` columns.
pub fn format_date(value: NaiveDateTime) -> String {
    value.format(DATE_FORMAT).to_string()
}

/// Parses ISO-8601 text, a space-separated datetime, RFC 3339 with an
/// offset (normalized to UTC), or a bare date (midnight).
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, ISO_FORMAT) {
        return Some(value);
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, SPACED_FORMAT) {
        return Some(value);
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(value.naive_utc());
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        date_at_midnight(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

fn date_at_midnight(date: NaiveDate) -> Value {
    date.and_hms_opt(0, 0, 0)
        .map_or(Value::Null, Value::Timestamp)
}

#[cfg(test)]
mod tests {
    use super::{format_decimal, format_timestamp, parse_timestamp, Value, ValueKind};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn format_decimal_pads_and_rounds_to_two_digits() {
        assert_eq!(format_decimal(Decimal::from_str("2.3").unwrap()), "2.30");
        assert_eq!(format_decimal(Decimal::from(10)), "10.00");
        assert_eq!(format_decimal(Decimal::from_str("1.005").unwrap()), "1.00");
    }

    #[test]
    fn timestamps_render_iso_and_parse_back() {
        let value = NaiveDate::from_ymd_opt(2010, 10, 10)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let text = format_timestamp(value);
        assert_eq!(text, "2010-10-10T00:00:00");
        assert_eq!(parse_timestamp(&text), Some(value));
        assert_eq!(parse_timestamp("2010-10-10"), Some(value));
        assert_eq!(parse_timestamp("2010-10-10 00:00:00"), Some(value));
        assert_eq!(parse_timestamp("2010-10-10T02:00:00+02:00"), Some(value));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn emptiness_excludes_zero_and_false() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("").is_empty());
        assert!(Value::Blob(Vec::new()).is_empty());
        assert!(!Value::from(0_i64).is_empty());
        assert!(!Value::from(false).is_empty());
    }

    #[test]
    fn json_projection_uses_wire_text_for_decimals() {
        let value = Value::Decimal(Decimal::from_str("2.3").unwrap());
        assert_eq!(value.to_json(), serde_json::json!("2.30"));
        assert_eq!(Value::from(Some(3_i64)).kind(), Some(ValueKind::Integer));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }
}
