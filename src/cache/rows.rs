//! Row synchronization: converging one cache row to the remote accessor's
//! latest return value.
//!
//! The upsert is tri-state: insert when the row is absent and the data does
//! not signal deletion, update only the supplied fields when it exists, and
//! delete when the data is absent or carries `exists == false`. Deletion is
//! explicit and field-driven, never inferred from a missing field.

use std::collections::HashMap;

use super::call;
use super::error::CacheError;
use super::mapping;
use super::normalize::{CallSpec, TableSpec};
use crate::client::ContractConnection;
use crate::db::{CacheStore, DbOperation, DbValue, WhereClause};
use crate::types::{InterfaceDescription, Value};

/// Equality WHERE clause over the table's key columns. Requires at least as
/// many keys as the table has key columns; extra keys are ignored.
pub fn key_where(table: &TableSpec, keys: &[Value]) -> Result<WhereClause, CacheError> {
    if keys.len() < table.inputs.len() {
        return Err(CacheError::InsufficientKeys {
            table: table.name.clone(),
            expected: table.inputs.len(),
            got: keys.len(),
        });
    }

    let conditions = table
        .inputs
        .iter()
        .zip(keys.iter())
        .map(|(input, key)| {
            let context = format!("{}.{}", table.name, input.name);
            Ok((input.name.clone(), mapping::coerce(key, input.ty, &context)?))
        })
        .collect::<Result<Vec<_>, CacheError>>()?;

    Ok(WhereClause::And(conditions))
}

/// Select the cached row for a key tuple.
pub async fn get_row(
    store: &dyn CacheStore,
    table: &TableSpec,
    keys: &[Value],
) -> Result<Option<HashMap<String, DbValue>>, CacheError> {
    let where_clause = key_where(table, keys)?;
    Ok(store.select_row(&table.name, &where_clause).await?)
}

/// Re-read one row from the remote accessor and converge the cache to it.
pub async fn update_row(
    store: &dyn CacheStore,
    connection: &dyn ContractConnection,
    interface: &InterfaceDescription,
    table: &TableSpec,
    keys: &[Value],
) -> Result<(), CacheError> {
    if keys.len() < table.inputs.len() {
        return Err(CacheError::InsufficientKeys {
            table: table.name.clone(),
            expected: table.inputs.len(),
            got: keys.len(),
        });
    }

    let spec = CallSpec::Call {
        function: table.call.clone(),
        field: None,
    };
    let context = format!("tables.{}.call", table.name);
    let result = call::dispatch(
        connection,
        interface,
        &spec,
        &keys[..table.inputs.len()],
        &context,
    )
    .await?;

    set_row(store, table, Some(&result.values), keys).await
}

/// Deletion is signaled by absent data or an explicit `exists == false`.
fn is_deletion(data: Option<&HashMap<String, Value>>) -> bool {
    match data {
        None => true,
        Some(map) => map
            .get("exists")
            .and_then(|v| v.as_bool())
            .is_some_and(|exists| !exists),
    }
}

/// Tri-state upsert of one row.
pub async fn set_row(
    store: &dyn CacheStore,
    table: &TableSpec,
    data: Option<&HashMap<String, Value>>,
    keys: &[Value],
) -> Result<(), CacheError> {
    let where_clause = key_where(table, keys)?;
    let existing = store.select_row(&table.name, &where_clause).await?;

    if is_deletion(data) {
        if existing.is_some() {
            store
                .execute(DbOperation::Delete {
                    table: table.name.clone(),
                    where_clause,
                })
                .await?;
        }
        return Ok(());
    }

    // Not a deletion, so data is present.
    let data = match data {
        Some(data) => data,
        None => return Ok(()),
    };

    // Only fields actually present in the data participate; the rest keep
    // their current value (or column default on insert).
    let field_values: Vec<(String, DbValue)> = table
        .fields
        .iter()
        .filter_map(|field| {
            data.get(&field.name).map(|value| {
                let context = format!("{}.{}", table.name, field.name);
                mapping::coerce(value, field.ty, &context).map(|db| (field.name.clone(), db))
            })
        })
        .collect::<Result<_, _>>()?;

    match existing {
        None => {
            let mut columns: Vec<String> = Vec::new();
            let mut values: Vec<DbValue> = Vec::new();
            for (col, val) in where_clause.conditions() {
                columns.push(col);
                values.push(val);
            }
            for (col, val) in field_values {
                columns.push(col);
                values.push(val);
            }
            store
                .execute(DbOperation::Insert {
                    table: table.name.clone(),
                    columns,
                    values,
                })
                .await?;
        }
        Some(_) => {
            if !field_values.is_empty() {
                store
                    .execute(DbOperation::Update {
                        table: table.name.clone(),
                        set_columns: field_values,
                        where_clause,
                    })
                    .await?;
            }
        }
    }

    Ok(())
}

/// Unconditional delete by key, used by remove-event handling.
pub async fn remove_row(
    store: &dyn CacheStore,
    table: &TableSpec,
    keys: &[Value],
) -> Result<(), CacheError> {
    let where_clause = key_where(table, keys)?;
    store
        .execute(DbOperation::Delete {
            table: table.name.clone(),
            where_clause,
        })
        .await?;
    Ok(())
}
