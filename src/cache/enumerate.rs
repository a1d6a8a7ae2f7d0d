//! Key-space enumeration along one dependency path.
//!
//! The remote engine cannot be queried, so the key space is discovered by
//! walking the path root → leaf: for each already-known prefix tuple the
//! key's `min` and `len` specs yield an index range, and an optional
//! `deserialize` call turns each index into the real key value. Calls are
//! issued strictly one at a time in a fixed traversal order, so the result
//! is deterministic.

use std::collections::BTreeMap;

use super::call;
use super::error::CacheError;
use super::normalize::KeySpec;
use crate::client::ContractConnection;
use crate::types::{InterfaceDescription, Value};

/// Enumerate all key tuples realizable along `path` (ordered root → leaf).
///
/// Returns the path's column order together with the tuples. A prefix whose
/// `len` evaluates to 0 contributes no tuples.
pub async fn enumerate_path(
    connection: &dyn ContractConnection,
    interface: &InterfaceDescription,
    init_seq: &BTreeMap<String, KeySpec>,
    path: &[String],
) -> Result<(Vec<String>, Vec<Vec<Value>>), CacheError> {
    let mut tuples: Vec<Vec<Value>> = vec![Vec::new()];

    for key in path {
        let spec = init_seq
            .get(key)
            .ok_or_else(|| CacheError::config(format!("no key spec for '{}'", key)))?;

        let mut extended = Vec::new();
        for prefix in &tuples {
            let min = call::dispatch_u64(
                connection,
                interface,
                &spec.min,
                prefix,
                &format!("initSeq.{}.min", key),
            )
            .await?;
            let len = call::dispatch_u64(
                connection,
                interface,
                &spec.len,
                prefix,
                &format!("initSeq.{}.len", key),
            )
            .await?;

            for index in min..min.saturating_add(len) {
                let value = match &spec.deserialize {
                    Some(de) => {
                        let mut args = prefix.clone();
                        args.push(Value::Uint(index));
                        let context = format!("initSeq.{}.deserialize", key);
                        let result =
                            call::dispatch(connection, interface, de, &args, &context).await?;
                        call::selected(&result, de)
                            .cloned()
                            .ok_or_else(|| CacheError::value(&context, "call returned no value"))?
                    }
                    None => Value::Uint(index),
                };

                let mut tuple = prefix.clone();
                tuple.push(value);
                extended.push(tuple);
            }
        }
        tuples = extended;
    }

    Ok((path.to_vec(), tuples))
}
