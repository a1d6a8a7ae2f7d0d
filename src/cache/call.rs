//! Call-spec dispatch against a contract connection.

use std::collections::HashMap;

use super::error::CacheError;
use super::mapping;
use super::normalize::{resolve_function, CallSpec};
use crate::client::ContractConnection;
use crate::types::{InterfaceDescription, Value};

/// Normalized result of one dispatched call.
#[derive(Debug, Clone)]
pub struct CallResult {
    /// Ordered output values as returned by the function.
    pub raw: Vec<Value>,
    /// Outputs keyed by their declared names.
    pub values: HashMap<String, Value>,
}

impl CallResult {
    fn constant(value: Value) -> Self {
        Self {
            raw: vec![value],
            values: HashMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// First raw output, for single-valued calls.
    pub fn scalar(&self) -> Option<&Value> {
        self.raw.first()
    }
}

/// Resolve a call spec and invoke it.
///
/// Constants return without remote I/O. Function calls require the function
/// to exist exactly once in the interface and the argument count to match
/// its declared inputs; arguments are coerced to the declared input types.
pub async fn dispatch(
    connection: &dyn ContractConnection,
    interface: &InterfaceDescription,
    spec: &CallSpec,
    args: &[Value],
    context: &str,
) -> Result<CallResult, CacheError> {
    let (function, _) = match spec {
        CallSpec::Constant(value) => return Ok(CallResult::constant(value.clone())),
        CallSpec::Call { function, field } => (function, field),
    };

    let function_desc = resolve_function(interface, function, context)?;

    if args.len() != function_desc.inputs.len() {
        return Err(CacheError::ArgumentCount {
            function: function.clone(),
            expected: function_desc.inputs.len(),
            got: args.len(),
        });
    }

    let coerced: Vec<Value> = args
        .iter()
        .zip(function_desc.inputs.iter())
        .map(|(arg, input)| {
            mapping::coerce_arg(arg, input.ty, &format!("{}({})", function, input.name))
        })
        .collect::<Result<_, _>>()?;

    let raw = connection.call(function, &coerced).await?;

    let values = function_desc
        .outputs
        .iter()
        .zip(raw.iter())
        .map(|(output, value)| (output.name.clone(), value.clone()))
        .collect();

    Ok(CallResult { raw, values })
}

/// Dispatch a spec whose result must be a single number, honoring the
/// spec's `field` selector. Used for `min` and `len` evaluation.
pub async fn dispatch_u64(
    connection: &dyn ContractConnection,
    interface: &InterfaceDescription,
    spec: &CallSpec,
    args: &[Value],
    context: &str,
) -> Result<u64, CacheError> {
    let result = dispatch(connection, interface, spec, args, context).await?;
    let value = selected(&result, spec)
        .ok_or_else(|| CacheError::value(context, "call returned no value"))?;
    value
        .as_u64()
        .ok_or_else(|| CacheError::value(context, format!("expected number, got {:?}", value)))
}

/// The value a spec selects from its result: the named output field when one
/// is given, otherwise the first raw output.
pub fn selected<'a>(result: &'a CallResult, spec: &CallSpec) -> Option<&'a Value> {
    match spec {
        CallSpec::Call {
            field: Some(field), ..
        } => result.field(field),
        _ => result.scalar(),
    }
}
