//! Field-type mapping between remote value types, column types and bind
//! parameters.
//!
//! The remote engine hands back loosely shaped values (an address may arrive
//! as a hex string, a bool as 0/1); `coerce` normalizes them into the typed
//! bind parameter the column expects, and `coerce_arg` does the same for
//! outgoing call arguments.

use alloy_primitives::{hex, Address};

use super::error::CacheError;
use crate::db::{ColumnSchema, ColumnType, DbValue};
use crate::types::{Value, ValueType};

/// Relational column type for a declared remote value type.
pub fn column_type(ty: ValueType) -> ColumnType {
    match ty {
        ValueType::Int => ColumnType::BigInt,
        ValueType::Bool => ColumnType::Boolean,
        ValueType::Bytes | ValueType::Address => ColumnType::Bytea,
        ValueType::String => ColumnType::Text,
    }
}

/// Column schema for one named, typed field.
pub fn column_schema(name: &str, ty: ValueType, primary_key: bool) -> ColumnSchema {
    ColumnSchema {
        name: name.to_string(),
        ty: column_type(ty),
        primary_key,
    }
}

fn hex_bytes(s: &str, context: &str) -> Result<Vec<u8>, CacheError> {
    hex::decode(s).map_err(|e| CacheError::value(context, format!("invalid hex string: {}", e)))
}

/// Coerce a runtime value into the bind parameter for a column of the given
/// declared type.
pub fn coerce(value: &Value, ty: ValueType, context: &str) -> Result<DbValue, CacheError> {
    match ty {
        ValueType::Int => match value {
            Value::Uint(v) => i64::try_from(*v)
                .map(DbValue::Int64)
                .map_err(|_| CacheError::value(context, format!("integer overflow: {}", v))),
            Value::Int(v) => Ok(DbValue::Int64(*v)),
            Value::Bool(v) => Ok(DbValue::Int64(*v as i64)),
            Value::String(s) => s
                .parse::<i64>()
                .map(DbValue::Int64)
                .map_err(|_| CacheError::value(context, format!("expected integer, got '{}'", s))),
            other => Err(CacheError::value(
                context,
                format!("expected integer, got {:?}", other),
            )),
        },
        ValueType::Bool => value
            .as_bool()
            .map(DbValue::Bool)
            .ok_or_else(|| CacheError::value(context, format!("expected bool, got {:?}", value))),
        ValueType::Bytes => match value {
            Value::Bytes(b) => Ok(DbValue::Bytes(b.clone())),
            Value::Address(a) => Ok(DbValue::Bytes(a.to_vec())),
            Value::String(s) => hex_bytes(s, context).map(DbValue::Bytes),
            other => Err(CacheError::value(
                context,
                format!("expected bytes, got {:?}", other),
            )),
        },
        ValueType::Address => match value {
            Value::Address(a) => Ok(DbValue::Bytes(a.to_vec())),
            Value::Bytes(b) if b.len() == Address::len_bytes() => Ok(DbValue::Bytes(b.clone())),
            Value::String(s) => {
                let bytes = hex_bytes(s, context)?;
                if bytes.len() != Address::len_bytes() {
                    return Err(CacheError::value(
                        context,
                        format!("expected 20-byte address, got {} bytes", bytes.len()),
                    ));
                }
                Ok(DbValue::Bytes(bytes))
            }
            other => Err(CacheError::value(
                context,
                format!("expected address, got {:?}", other),
            )),
        },
        ValueType::String => match value {
            Value::String(s) => Ok(DbValue::Text(s.clone())),
            Value::Uint(v) => Ok(DbValue::Text(v.to_string())),
            Value::Int(v) => Ok(DbValue::Text(v.to_string())),
            other => Err(CacheError::value(
                context,
                format!("expected string, got {:?}", other),
            )),
        },
    }
}

/// Coerce a value into the declared type of a function input, for outgoing
/// calls.
pub fn coerce_arg(value: &Value, ty: ValueType, context: &str) -> Result<Value, CacheError> {
    match ty {
        ValueType::Int => match value {
            Value::Uint(_) | Value::Int(_) => Ok(value.clone()),
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| CacheError::value(context, format!("expected integer, got '{}'", s))),
            other => Err(CacheError::value(
                context,
                format!("expected integer, got {:?}", other),
            )),
        },
        ValueType::Bool => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| CacheError::value(context, format!("expected bool, got {:?}", value))),
        ValueType::Bytes => match value {
            Value::Bytes(_) => Ok(value.clone()),
            Value::Address(a) => Ok(Value::Bytes(a.to_vec())),
            Value::String(s) => hex_bytes(s, context).map(Value::Bytes),
            other => Err(CacheError::value(
                context,
                format!("expected bytes, got {:?}", other),
            )),
        },
        ValueType::Address => match value {
            Value::Address(_) => Ok(value.clone()),
            Value::Bytes(b) if b.len() == Address::len_bytes() => {
                Ok(Value::Address(Address::from_slice(b)))
            }
            Value::String(s) => {
                let bytes = hex_bytes(s, context)?;
                if bytes.len() != Address::len_bytes() {
                    return Err(CacheError::value(
                        context,
                        format!("expected 20-byte address, got {} bytes", bytes.len()),
                    ));
                }
                Ok(Value::Address(Address::from_slice(&bytes)))
            }
            other => Err(CacheError::value(
                context,
                format!("expected address, got {:?}", other),
            )),
        },
        ValueType::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Uint(v) => Ok(Value::String(v.to_string())),
            Value::Int(v) => Ok(Value::String(v.to_string())),
            other => Err(CacheError::value(
                context,
                format!("expected string, got {:?}", other),
            )),
        },
    }
}
