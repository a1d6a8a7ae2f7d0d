//! Remote contract interface descriptions and runtime values.
//!
//! An `InterfaceDescription` is the typed catalogue of a contract's callable
//! functions and emittable events. It is supplied by the caller at contract
//! registration and read-only afterwards.

use std::fmt;

use alloy_primitives::{hex, Address};
use serde::Deserialize;

/// Declared type of a function input/output or event field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Bytes,
    Address,
    Bool,
    String,
}

/// A runtime value returned by a remote call or carried by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Uint(u64),
    Int(i64),
    Bytes(Vec<u8>),
    Address(Address),
    Bool(bool),
    String(String),
}

impl Value {
    /// Numeric view, used for key indices and `min`/`len` results.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Uint(v) => Some(*v != 0),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "{}", hex::encode_prefixed(v)),
            Value::Address(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
        }
    }
}

/// A named, typed input/output/field slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypedField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

impl TypedField {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// One callable function: name, ordered typed inputs, ordered typed outputs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunctionDescription {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<TypedField>,
    #[serde(default)]
    pub outputs: Vec<TypedField>,
}

impl FunctionDescription {
    pub fn output_named(&self, name: &str) -> Option<&TypedField> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// One emittable event: name and ordered typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventDescription {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<TypedField>,
}

/// Immutable description of a remote contract's callable surface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterfaceDescription {
    #[serde(default)]
    pub functions: Vec<FunctionDescription>,
    #[serde(default)]
    pub events: Vec<EventDescription>,
}

impl InterfaceDescription {
    /// All functions with the given name. Callers that need exactly one
    /// match validate the count themselves.
    pub fn functions_named(&self, name: &str) -> impl Iterator<Item = &FunctionDescription> {
        let name = name.to_string();
        self.functions.iter().filter(move |f| f.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&EventDescription> {
        self.events.iter().find(|e| e.name == name)
    }
}
