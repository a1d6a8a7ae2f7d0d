//! Store seam between the cache core and the relational backend.
//!
//! The cache core never builds SQL strings itself; it hands structured
//! schemas and operations to a `CacheStore`. The fixed method set keeps the
//! backend swappable (Postgres in production, in-memory in tests).

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::DbError;
use super::types::{DbOperation, DbValue, TableSchema, WhereClause};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create a table. Fails if a table with the same name already exists.
    async fn create_table(&self, schema: &TableSchema) -> Result<(), DbError>;

    /// Drop a table by name.
    async fn drop_table(&self, name: &str) -> Result<(), DbError>;

    /// Execute one write operation, returning the number of affected rows.
    async fn execute(&self, op: DbOperation) -> Result<u64, DbError>;

    /// Select at most one row matching the WHERE clause, as column → value.
    async fn select_row(
        &self,
        table: &str,
        where_clause: &WhereClause,
    ) -> Result<Option<HashMap<String, DbValue>>, DbError>;
}
