//! Serialize/deserialize pipeline.
//!
//! `serialize` runs default -> cast -> wire text; `encode` additionally
//! seals encrypted columns. `deserialize` runs open -> normalize and never
//! fails for a declared column.

use crate::codec::FieldTypeError;
use crate::error::{OrmError, OrmResult};
use crate::model::value::{
    format_date, format_decimal, format_timestamp, parse_timestamp, Value, ValueKind,
};
use crate::schema::{ColumnSpec, Schema};
use log::debug;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Applies the column default and casts to the column's logical kind.
///
/// Values that are still empty after defaulting pass through unchanged.
///
/// # Errors
/// - `InvalidColumnName` for undeclared columns.
/// - `FieldType` when the cast fails.
pub fn cast(schema: &Schema, column: &str, raw: &Value) -> OrmResult<Value> {
    let spec = column_spec(schema, column)?;
    let mut value = raw.clone();
    if value.is_empty() {
        if let Some(default) = spec.default.as_ref() {
            value = default.produce();
        }
    }
    if value.is_empty() || value.kind() == Some(spec.kind) {
        return Ok(value);
    }

    convert(&value, spec.kind)
        .map_err(|message| OrmError::FieldType(field_type_error(schema, spec, message)))
}

/// Produces the wire form of one field (no encryption).
pub fn serialize(schema: &Schema, column: &str, raw: &Value) -> OrmResult<Value> {
    let spec = column_spec(schema, column)?;
    let value = cast(schema, column, raw)?;
    Ok(to_wire(spec, value))
}

/// Renders a filter operand the way the column stores it, so equality and
/// LIKE predicates compare against the same text the write path produced.
///
/// Unlike [`serialize`], no default is applied: an empty operand stays
/// empty and `Null` still compiles to `IS NULL`. Encrypted columns and
/// undeclared names pass through untouched.
///
/// # Errors
/// - [`FieldTypeError`] when the operand cannot be cast to the column kind.
pub fn filter_operand(
    schema: &Schema,
    column: &str,
    raw: Value,
) -> Result<Value, FieldTypeError> {
    let Some(spec) = schema.column(column) else {
        return Ok(raw);
    };
    if raw.is_empty() || schema.is_encrypted(column) {
        return Ok(raw);
    }
    let value = if raw.kind() == Some(spec.kind) {
        raw
    } else {
        convert(&raw, spec.kind).map_err(|message| field_type_error(schema, spec, message))?
    };
    Ok(to_wire(spec, value))
}

/// Produces the storage form of one field: wire form, sealed when the
/// column is enrolled for encryption.
pub fn encode(schema: &Schema, column: &str, raw: &Value) -> OrmResult<Value> {
    let wire = serialize(schema, column, raw)?;
    encrypt(schema, column, wire)
}

/// Seals a wire value under the column key with a fresh nonce.
pub fn encrypt(schema: &Schema, column: &str, wire: Value) -> OrmResult<Value> {
    let Some(cipher) = schema.cipher(column) else {
        return Ok(wire);
    };
    let plaintext = match wire {
        Value::Null => return Ok(Value::Null),
        Value::Blob(bytes) => bytes,
        other => other.to_text().unwrap_or_default().into_bytes(),
    };
    cipher
        .seal(&plaintext)
        .map(Value::Blob)
        .ok_or_else(|| OrmError::Encryption {
            entity: schema.entity().to_string(),
            column: column.to_string(),
        })
}

/// Opens a sealed value; anything that does not open is returned as is.
pub fn decrypt(schema: &Schema, column: &str, value: Value) -> Value {
    let (Some(cipher), Some(spec)) = (schema.cipher(column), schema.column(column)) else {
        return value;
    };
    let Value::Blob(sealed) = &value else {
        return value;
    };
    match cipher.open(sealed) {
        Some(plaintext) => decode_plaintext(spec, plaintext),
        None => {
            debug!(
                "event=decrypt_fallback module=codec status=plain entity={} column={}",
                schema.entity(),
                column
            );
            value
        }
    }
}

/// Converts a wire/storage value back into its in-memory form.
///
/// # Errors
/// - `InvalidColumnName` for undeclared columns.
pub fn deserialize(schema: &Schema, column: &str, wire: Value) -> OrmResult<Value> {
    let spec = column_spec(schema, column)?;
    let value = decrypt(schema, column, wire);
    Ok(normalize(spec.kind, value))
}

fn to_wire(spec: &ColumnSpec, value: Value) -> Value {
    match value {
        Value::Decimal(decimal) => Value::Text(format_decimal(decimal)),
        Value::Timestamp(timestamp) if spec.date_only => Value::Text(format_date(timestamp)),
        Value::Timestamp(timestamp) => Value::Text(format_timestamp(timestamp)),
        other => other,
    }
}

fn field_type_error(schema: &Schema, spec: &ColumnSpec, message: String) -> FieldTypeError {
    FieldTypeError {
        entity: schema.entity().to_string(),
        column: spec.name.clone(),
        expected: spec.kind,
        message,
    }
}

fn column_spec<'s>(schema: &'s Schema, column: &str) -> OrmResult<&'s ColumnSpec> {
    schema
        .column(column)
        .ok_or_else(|| OrmError::invalid_column(schema, column))
}

fn decode_plaintext(spec: &ColumnSpec, plaintext: Vec<u8>) -> Value {
    if spec.kind == ValueKind::Binary {
        return Value::Blob(plaintext);
    }
    match String::from_utf8(plaintext) {
        Ok(text) => {
            let value = Value::Text(text);
            convert(&value, spec.kind).unwrap_or(value)
        }
        Err(err) => Value::Blob(err.into_bytes()),
    }
}

/// Folds storage-native shapes (0/1 booleans, decimal and timestamp text)
/// into the column kind; unparsable values are left alone.
fn normalize(kind: ValueKind, value: Value) -> Value {
    match (kind, value) {
        (ValueKind::Timestamp, Value::Text(text)) => match parse_timestamp(&text) {
            Some(timestamp) => Value::Timestamp(timestamp),
            None => Value::Text(text),
        },
        (ValueKind::Decimal, Value::Text(text)) => match Decimal::from_str(text.trim()) {
            Ok(decimal) => Value::Decimal(decimal),
            Err(_) => Value::Text(text),
        },
        (ValueKind::Decimal, Value::Integer(number)) => Value::Decimal(Decimal::from(number)),
        (ValueKind::Boolean, Value::Integer(0)) => Value::Boolean(false),
        (ValueKind::Boolean, Value::Integer(1)) => Value::Boolean(true),
        (_, other) => other,
    }
}

fn convert(value: &Value, kind: ValueKind) -> Result<Value, String> {
    let unsupported = || {
        format!(
            "cannot cast {} value to {kind}",
            value.kind().map_or("null", ValueKind::as_str)
        )
    };

    match kind {
        ValueKind::Integer => match value {
            Value::Text(text) => text
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|err| format!("invalid integer literal `{text}`: {err}")),
            Value::Decimal(decimal) if decimal.fract().is_zero() => decimal
                .to_i64()
                .map(Value::Integer)
                .ok_or_else(|| format!("decimal {decimal} does not fit in an integer")),
            Value::Decimal(decimal) => Err(format!("decimal {decimal} has a fractional part")),
            Value::Boolean(flag) => Ok(Value::Integer(i64::from(*flag))),
            _ => Err(unsupported()),
        },
        ValueKind::Decimal => match value {
            Value::Integer(number) => Ok(Value::Decimal(Decimal::from(*number))),
            Value::Text(text) => Decimal::from_str(text.trim())
                .map(Value::Decimal)
                .map_err(|err| format!("invalid decimal literal `{text}`: {err}")),
            Value::Boolean(flag) => Ok(Value::Decimal(Decimal::from(i64::from(*flag)))),
            _ => Err(unsupported()),
        },
        ValueKind::Text => value
            .to_text()
            .map(Value::Text)
            .ok_or_else(|| "binary value is not valid UTF-8 text".to_string()),
        ValueKind::Boolean => match value {
            Value::Integer(number) => Ok(Value::Boolean(*number != 0)),
            Value::Decimal(decimal) => Ok(Value::Boolean(!decimal.is_zero())),
            Value::Text(text) => parse_bool(text)
                .map(Value::Boolean)
                .ok_or_else(|| format!("invalid boolean literal `{text}`")),
            _ => Err(unsupported()),
        },
        ValueKind::Timestamp => match value {
            Value::Text(text) => parse_timestamp(text)
                .map(Value::Timestamp)
                .ok_or_else(|| format!("invalid timestamp literal `{text}`")),
            _ => Err(unsupported()),
        },
        ValueKind::Binary => match value {
            Value::Text(text) => Ok(Value::Blob(text.clone().into_bytes())),
            _ => Err(unsupported()),
        },
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}
