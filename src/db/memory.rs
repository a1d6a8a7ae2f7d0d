//! In-process cache store.
//!
//! Interprets the same structured operations as the Postgres store over a
//! plain map of tables. Used by the test suite and by embedders that want a
//! cache without an external database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::error::DbError;
use super::store::CacheStore;
use super::types::{DbOperation, DbValue, TableSchema, WhereClause};

#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<HashMap<String, DbValue>>,
}

impl MemTable {
    fn primary_key(&self, row: &HashMap<String, DbValue>) -> Vec<DbValue> {
        self.schema
            .primary_key_columns()
            .map(|c| row.get(&c.name).cloned().unwrap_or(DbValue::Null))
            .collect()
    }
}

/// In-memory implementation of `CacheStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, MemTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently in a table. Test/introspection helper.
    pub async fn row_count(&self, table: &str) -> Result<usize, DbError> {
        let tables = self.tables.lock().await;
        let table = tables
            .get(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;
        Ok(table.rows.len())
    }

    /// Snapshot of all rows of a table. Test/introspection helper.
    pub async fn rows(&self, table: &str) -> Result<Vec<HashMap<String, DbValue>>, DbError> {
        let tables = self.tables.lock().await;
        let table = tables
            .get(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;
        Ok(table.rows.clone())
    }
}

fn matches(row: &HashMap<String, DbValue>, where_clause: &WhereClause) -> bool {
    where_clause
        .conditions()
        .iter()
        .all(|(col, val)| row.get(col) == Some(val))
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn create_table(&self, schema: &TableSchema) -> Result<(), DbError> {
        let mut tables = self.tables.lock().await;
        if tables.contains_key(&schema.name) {
            return Err(DbError::DuplicateTable(schema.name.clone()));
        }
        tables.insert(
            schema.name.clone(),
            MemTable {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<(), DbError> {
        let mut tables = self.tables.lock().await;
        tables
            .remove(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))?;
        Ok(())
    }

    async fn execute(&self, op: DbOperation) -> Result<u64, DbError> {
        let mut tables = self.tables.lock().await;
        match op {
            DbOperation::Insert {
                table,
                columns,
                values,
            } => {
                let mem = tables
                    .get_mut(&table)
                    .ok_or_else(|| DbError::UnknownTable(table.clone()))?;

                // Start from column defaults so partial inserts behave like
                // the relational store.
                let mut row: HashMap<String, DbValue> = mem
                    .schema
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.ty.default_value()))
                    .collect();
                for (col, val) in columns.into_iter().zip(values.into_iter()) {
                    row.insert(col, val);
                }

                let pk = mem.primary_key(&row);
                if mem.rows.iter().any(|r| mem.primary_key(r) == pk) {
                    return Err(DbError::DuplicateKey {
                        table,
                        key: format!("{:?}", pk),
                    });
                }
                mem.rows.push(row);
                Ok(1)
            }
            DbOperation::Update {
                table,
                set_columns,
                where_clause,
            } => {
                let mem = tables
                    .get_mut(&table)
                    .ok_or_else(|| DbError::UnknownTable(table.clone()))?;
                let mut affected = 0;
                for row in mem.rows.iter_mut().filter(|r| matches(r, &where_clause)) {
                    for (col, val) in &set_columns {
                        row.insert(col.clone(), val.clone());
                    }
                    affected += 1;
                }
                Ok(affected)
            }
            DbOperation::Delete {
                table,
                where_clause,
            } => {
                let mem = tables
                    .get_mut(&table)
                    .ok_or_else(|| DbError::UnknownTable(table.clone()))?;
                let before = mem.rows.len();
                mem.rows.retain(|r| !matches(r, &where_clause));
                Ok((before - mem.rows.len()) as u64)
            }
        }
    }

    async fn select_row(
        &self,
        table: &str,
        where_clause: &WhereClause,
    ) -> Result<Option<HashMap<String, DbValue>>, DbError> {
        let tables = self.tables.lock().await;
        let mem = tables
            .get(table)
            .ok_or_else(|| DbError::UnknownTable(table.to_string()))?;
        Ok(mem.rows.iter().find(|r| matches(r, where_clause)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::{ColumnSchema, ColumnType};

    fn schema() -> TableSchema {
        TableSchema {
            name: "t".to_string(),
            columns: vec![
                ColumnSchema {
                    name: "k".to_string(),
                    ty: ColumnType::BigInt,
                    primary_key: true,
                },
                ColumnSchema {
                    name: "v".to_string(),
                    ty: ColumnType::Text,
                    primary_key: false,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_insert_select_delete() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();

        store
            .execute(DbOperation::Insert {
                table: "t".to_string(),
                columns: vec!["k".to_string(), "v".to_string()],
                values: vec![DbValue::Int64(1), DbValue::Text("a".to_string())],
            })
            .await
            .unwrap();

        let row = store
            .select_row("t", &WhereClause::Eq("k".to_string(), DbValue::Int64(1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("v"), Some(&DbValue::Text("a".to_string())));

        let affected = store
            .execute(DbOperation::Delete {
                table: "t".to_string(),
                where_clause: WhereClause::Eq("k".to_string(), DbValue::Int64(1)),
            })
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(store.row_count("t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();

        let insert = DbOperation::Insert {
            table: "t".to_string(),
            columns: vec!["k".to_string()],
            values: vec![DbValue::Int64(7)],
        };
        store.execute(insert.clone()).await.unwrap();
        assert!(matches!(
            store.execute(insert).await,
            Err(DbError::DuplicateKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_partial_insert_fills_defaults() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();

        store
            .execute(DbOperation::Insert {
                table: "t".to_string(),
                columns: vec!["k".to_string()],
                values: vec![DbValue::Int64(2)],
            })
            .await
            .unwrap();

        let row = store
            .select_row("t", &WhereClause::Eq("k".to_string(), DbValue::Int64(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("v"), Some(&DbValue::Text(String::new())));
    }

    #[tokio::test]
    async fn test_duplicate_table_rejected() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();
        assert!(matches!(
            store.create_table(&schema()).await,
            Err(DbError::DuplicateTable(_))
        ));
    }
}
