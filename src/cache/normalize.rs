//! Structure-definition validation and canonicalization.
//!
//! Turns the raw JSON configuration into the normalized model the rest of
//! the cache operates on: resolved call specs, typed key/value columns and
//! dependency-ordered enumeration paths. All configuration errors surface
//! here, before any table is created.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use super::error::CacheError;
use crate::types::definition::{
    CallSpecConfig, DefinitionConfig, EventRole, KeySpecConfig, TableSpecConfig,
};
use crate::types::{FunctionDescription, InterfaceDescription, Value, ValueType};

/// A resolved call spec: either a remote function (optionally one output
/// field of it) or a literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum CallSpec {
    Call {
        function: String,
        field: Option<String>,
    },
    Constant(Value),
}

/// One key column's derivation recipe, validated against the interface.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec {
    pub min: CallSpec,
    pub len: CallSpec,
    pub deserialize: Option<CallSpec>,
    pub dependent: Option<String>,
}

/// One named, typed column of a cache table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ValueType,
}

/// A normalized table entry.
///
/// `key_order` and `key_set` stay empty until backfill enumerates the key
/// space; everything else is immutable after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,
    /// Row-accessor function name.
    pub call: String,
    /// Key names in accessor-argument order.
    pub keys: Vec<String>,
    /// Key columns (named after the keys, typed after the accessor inputs).
    pub inputs: Vec<ColumnDef>,
    /// Value columns (named and typed after the accessor outputs).
    pub fields: Vec<ColumnDef>,
    /// One dependency chain per terminal key, each ordered root → leaf.
    pub paths: Vec<Vec<String>>,
    /// Final column ordering, populated during backfill.
    pub key_order: Vec<String>,
    /// All row key tuples, populated during backfill.
    pub key_set: Vec<Vec<Value>>,
}

impl TableSpec {
    pub fn input_named(&self, name: &str) -> Option<&ColumnDef> {
        self.inputs.iter().find(|c| c.name == name)
    }
}

/// A fully normalized structure definition.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureDefinition {
    pub init_seq: BTreeMap<String, KeySpec>,
    pub tables: BTreeMap<String, TableSpec>,
    pub event_roles: BTreeMap<String, EventRole>,
}

/// Validate and canonicalize a raw definition against a contract interface.
pub fn normalize(
    config: &DefinitionConfig,
    interface: &InterfaceDescription,
) -> Result<StructureDefinition, CacheError> {
    if config.tables.is_empty() {
        return Err(CacheError::config("'tables' must not be empty"));
    }

    let mut init_seq = BTreeMap::new();
    for (key, raw) in &config.init_seq {
        init_seq.insert(key.clone(), normalize_key_spec(key, raw, interface)?);
    }

    // Dependent references must resolve within the same definition, and
    // chains must terminate.
    for (key, spec) in &init_seq {
        if let Some(dep) = &spec.dependent {
            if !init_seq.contains_key(dep) {
                return Err(CacheError::UnknownDependency {
                    key: key.clone(),
                    dependent: dep.clone(),
                });
            }
        }
        dependency_chain(key, &init_seq)?;
    }

    let mut tables = BTreeMap::new();
    for (name, raw) in &config.tables {
        tables.insert(name.clone(), normalize_table(name, raw, &init_seq, interface)?);
    }

    let event_roles = match &config.events {
        Some(explicit) => {
            for event in explicit.keys() {
                if interface.event(event).is_none() {
                    return Err(CacheError::config(format!(
                        "events.{}: no such event in interface",
                        event
                    )));
                }
            }
            explicit.clone()
        }
        None => derive_event_roles(interface),
    };

    Ok(StructureDefinition {
        init_seq,
        tables,
        event_roles,
    })
}

/// Derive event roles from the interface when no explicit map is supplied:
/// update/remove-shaped event names auto-wire.
pub fn derive_event_roles(interface: &InterfaceDescription) -> BTreeMap<String, EventRole> {
    let mut roles = BTreeMap::new();
    for event in &interface.events {
        let lower = event.name.to_lowercase();
        if lower.contains("updat") {
            roles.insert(event.name.clone(), EventRole::Update);
        } else if lower.contains("remov") || lower.contains("delet") {
            roles.insert(event.name.clone(), EventRole::Remove);
        }
    }
    roles
}

fn normalize_key_spec(
    key: &str,
    raw: &KeySpecConfig,
    interface: &InterfaceDescription,
) -> Result<KeySpec, CacheError> {
    let min = match &raw.min {
        Some(spec) => normalize_call_spec(spec, &format!("initSeq.{}.min", key))?,
        None => CallSpec::Constant(Value::Uint(0)),
    };

    let len = raw
        .len
        .as_ref()
        .ok_or_else(|| CacheError::config(format!("initSeq.{}: missing 'len'", key)))?;
    let len = normalize_call_spec(len, &format!("initSeq.{}.len", key))?;

    let deserialize = raw
        .deserialize
        .as_ref()
        .map(|spec| normalize_call_spec(spec, &format!("initSeq.{}.deserialize", key)))
        .transpose()?;

    let spec = KeySpec {
        min,
        len,
        deserialize,
        dependent: raw.dependent.clone(),
    };

    for (call_spec, context) in [
        (&spec.min, format!("initSeq.{}.min", key)),
        (&spec.len, format!("initSeq.{}.len", key)),
    ] {
        validate_call_spec(call_spec, interface, &context)?;
    }
    if let Some(de) = &spec.deserialize {
        validate_call_spec(de, interface, &format!("initSeq.{}.deserialize", key))?;
    }

    Ok(spec)
}

fn normalize_call_spec(raw: &CallSpecConfig, context: &str) -> Result<CallSpec, CacheError> {
    match raw {
        CallSpecConfig::Name(name) => Ok(CallSpec::Call {
            function: name.clone(),
            field: None,
        }),
        CallSpecConfig::Spec { call, field } => Ok(CallSpec::Call {
            function: call.clone(),
            field: field.clone(),
        }),
        CallSpecConfig::Constant { constant } => {
            Ok(CallSpec::Constant(json_to_value(constant, context)?))
        }
        CallSpecConfig::Literal(value) => {
            Ok(CallSpec::Constant(json_to_value(value, context)?))
        }
    }
}

fn json_to_value(json: &JsonValue, context: &str) -> Result<Value, CacheError> {
    match json {
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        JsonValue::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok(Value::Uint(u))
            } else if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else {
                Err(CacheError::config(format!(
                    "{}: non-integer constant {}",
                    context, n
                )))
            }
        }
        other => Err(CacheError::config(format!(
            "{}: unsupported constant {}",
            context, other
        ))),
    }
}

/// Non-constant call specs must resolve to exactly one interface function,
/// and a named field must exist among its outputs.
fn validate_call_spec(
    spec: &CallSpec,
    interface: &InterfaceDescription,
    context: &str,
) -> Result<(), CacheError> {
    let (function, field) = match spec {
        CallSpec::Constant(_) => return Ok(()),
        CallSpec::Call { function, field } => (function, field),
    };

    let function_desc = resolve_function(interface, function, context)?;

    if let Some(field) = field {
        if function_desc.output_named(field).is_none() {
            return Err(CacheError::MissingField {
                function: function.clone(),
                field: field.clone(),
                context: context.to_string(),
            });
        }
    }

    Ok(())
}

/// Look up a function that must exist exactly once in the interface.
pub fn resolve_function<'a>(
    interface: &'a InterfaceDescription,
    function: &str,
    context: &str,
) -> Result<&'a FunctionDescription, CacheError> {
    let matches: Vec<_> = interface.functions_named(function).collect();
    match matches.len() {
        0 => Err(CacheError::UnknownFunction {
            function: function.to_string(),
            context: context.to_string(),
        }),
        1 => Ok(matches[0]),
        count => Err(CacheError::AmbiguousFunction {
            function: function.to_string(),
            count,
            context: context.to_string(),
        }),
    }
}

/// Walk a key's `dependent` links up to the root, returning the chain
/// ordered root → key. Rejects cycles.
pub fn dependency_chain(
    key: &str,
    init_seq: &BTreeMap<String, KeySpec>,
) -> Result<Vec<String>, CacheError> {
    let mut chain = vec![key.to_string()];
    let mut current = key;

    while let Some(spec) = init_seq.get(current) {
        match &spec.dependent {
            Some(dep) => {
                if chain.iter().any(|k| k == dep) {
                    return Err(CacheError::config(format!(
                        "dependency cycle through key '{}'",
                        dep
                    )));
                }
                chain.push(dep.clone());
                current = dep;
            }
            None => break,
        }
    }

    chain.reverse();
    Ok(chain)
}

fn normalize_table(
    name: &str,
    raw: &TableSpecConfig,
    init_seq: &BTreeMap<String, KeySpec>,
    interface: &InterfaceDescription,
) -> Result<TableSpec, CacheError> {
    let (call, explicit_keys) = match raw {
        TableSpecConfig::Name(call) => (call.clone(), None),
        TableSpecConfig::Spec { call, keys } => (call.clone(), keys.clone()),
    };

    let context = format!("tables.{}.call", name);
    let accessor = resolve_function(interface, &call, &context)?;

    let keys = match explicit_keys {
        Some(keys) => keys,
        None => accessor.inputs.iter().map(|i| i.name.clone()).collect(),
    };

    if keys.len() != accessor.inputs.len() {
        return Err(CacheError::config(format!(
            "tables.{}: {} key(s) declared but accessor '{}' takes {} argument(s)",
            name,
            keys.len(),
            call,
            accessor.inputs.len()
        )));
    }

    for key in &keys {
        if !init_seq.contains_key(key) {
            return Err(CacheError::UnknownKey {
                table: name.to_string(),
                key: key.clone(),
            });
        }
    }

    // Key columns are named after the keys and typed after the accessor's
    // inputs, positionally.
    let inputs: Vec<ColumnDef> = keys
        .iter()
        .zip(accessor.inputs.iter())
        .map(|(key, input)| ColumnDef {
            name: key.clone(),
            ty: input.ty,
        })
        .collect();

    let fields: Vec<ColumnDef> = accessor
        .outputs
        .iter()
        .map(|output| ColumnDef {
            name: output.name.clone(),
            ty: output.ty,
        })
        .collect();

    let paths = build_paths(name, &keys, init_seq)?;

    Ok(TableSpec {
        name: name.to_string(),
        call,
        keys,
        inputs,
        fields,
        paths,
        key_order: Vec::new(),
        key_set: Vec::new(),
    })
}

/// One enumeration path per independent dependency chain: a key is a path
/// terminus when no other key of the table lists it in its own chain.
fn build_paths(
    table: &str,
    keys: &[String],
    init_seq: &BTreeMap<String, KeySpec>,
) -> Result<Vec<Vec<String>>, CacheError> {
    let chains: Vec<(String, Vec<String>)> = keys
        .iter()
        .map(|k| dependency_chain(k, init_seq).map(|c| (k.clone(), c)))
        .collect::<Result<_, _>>()?;

    // Every chain member must itself be a key of the table, otherwise the
    // enumerated tuples would not line up with the accessor's arguments.
    for (key, chain) in &chains {
        for member in chain {
            if !keys.contains(member) {
                return Err(CacheError::config(format!(
                    "tables.{}: key '{}' depends on '{}' which is not among the table's keys",
                    table, key, member
                )));
            }
        }
    }

    let mut paths = Vec::new();
    for (key, chain) in &chains {
        let terminal = !chains
            .iter()
            .any(|(other, other_chain)| other != key && other_chain.contains(key));
        if terminal {
            paths.push(chain.clone());
        }
    }

    Ok(paths)
}
