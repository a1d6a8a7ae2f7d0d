use std::collections::HashMap;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;

use super::error::DbError;
use super::store::CacheStore;
use super::types::{DbOperation, DbValue, TableSchema, WhereClause};

/// Postgres-backed cache store on a deadpool connection pool.
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DbError::InvalidConnectionString(e.to_string()))?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = Manager::from_config(config, NoTls, manager_config);

        let pool = Pool::builder(manager)
            .max_size(16)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(DbError::BuildError)?;

        let _conn = pool.get().await?;
        tracing::info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    pub fn inner(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl CacheStore for PostgresStore {
    async fn create_table(&self, schema: &TableSchema) -> Result<(), DbError> {
        let client = self.pool.get().await?;
        let sql = build_create_table_sql(schema);
        client.batch_execute(&sql).await.map_err(|e| {
            if let Some(db_err) = e.as_db_error() {
                // 42P07: duplicate_table
                if db_err.code().code() == "42P07" {
                    return DbError::DuplicateTable(schema.name.clone());
                }
            }
            DbError::PostgresError(e)
        })?;
        tracing::info!("Created cache table '{}'", schema.name);
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<(), DbError> {
        let client = self.pool.get().await?;
        let sql = format!("DROP TABLE {}", quote_ident(name));
        client.batch_execute(&sql).await?;
        tracing::info!("Dropped cache table '{}'", name);
        Ok(())
    }

    async fn execute(&self, op: DbOperation) -> Result<u64, DbError> {
        let (sql, params) = match op {
            DbOperation::Insert {
                table,
                columns,
                values,
            } => build_insert_sql(&table, &columns, &values),
            DbOperation::Update {
                table,
                set_columns,
                where_clause,
            } => build_update_sql(&table, &set_columns, &where_clause),
            DbOperation::Delete {
                table,
                where_clause,
            } => build_delete_sql(&table, &where_clause),
        };

        let params_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let client = self.pool.get().await?;
        let affected = client.execute(&sql, &params_refs[..]).await.map_err(|e| {
            let db_err: DbError = e.into();
            tracing::error!("SQL execution failed\n  SQL: {}\n  Error: {}", sql, db_err);
            db_err
        })?;
        Ok(affected)
    }

    async fn select_row(
        &self,
        table: &str,
        where_clause: &WhereClause,
    ) -> Result<Option<HashMap<String, DbValue>>, DbError> {
        let (sql, params) = build_select_sql(table, where_clause);
        let params_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let client = self.pool.get().await?;
        let row = client.query_opt(&sql, &params_refs[..]).await?;

        match row {
            Some(row) => Ok(Some(row_to_map(&row)?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug)]
enum SqlParam {
    Null,
    Bool(bool),
    Int64(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<tokio_postgres::types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlParam::Null => Ok(tokio_postgres::types::IsNull::Yes),
            SqlParam::Bool(v) => v.to_sql(ty, out),
            SqlParam::Int64(v) => v.to_sql(ty, out),
            SqlParam::Text(v) => v.to_sql(ty, out),
            SqlParam::Bytes(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <bool as ToSql>::accepts(ty)
            || <i64 as ToSql>::accepts(ty)
            || <String as ToSql>::accepts(ty)
            || <Vec<u8> as ToSql>::accepts(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}

fn convert_db_value(value: &DbValue) -> SqlParam {
    match value {
        DbValue::Null => SqlParam::Null,
        DbValue::Bool(v) => SqlParam::Bool(*v),
        DbValue::Int64(v) => SqlParam::Int64(*v),
        DbValue::Text(v) => SqlParam::Text(v.clone()),
        DbValue::Bytes(v) => SqlParam::Bytes(v.clone()),
    }
}

fn row_to_map(row: &tokio_postgres::Row) -> Result<HashMap<String, DbValue>, DbError> {
    let mut map = HashMap::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.get::<_, Option<bool>>(idx)
                .map(DbValue::Bool)
                .unwrap_or(DbValue::Null)
        } else if *ty == Type::INT8 {
            row.get::<_, Option<i64>>(idx)
                .map(DbValue::Int64)
                .unwrap_or(DbValue::Null)
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
            row.get::<_, Option<String>>(idx)
                .map(DbValue::Text)
                .unwrap_or(DbValue::Null)
        } else if *ty == Type::BYTEA {
            row.get::<_, Option<Vec<u8>>>(idx)
                .map(DbValue::Bytes)
                .unwrap_or(DbValue::Null)
        } else {
            return Err(DbError::UnsupportedColumn {
                column: column.name().to_string(),
                column_type: ty.to_string(),
            });
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

/// Wrap a column name in double quotes to handle reserved keywords.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

fn quote_cols(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_create_table_sql(schema: &TableSchema) -> String {
    let mut parts: Vec<String> = Vec::new();
    for col in &schema.columns {
        if col.primary_key {
            parts.push(format!("{} {}", quote_ident(&col.name), col.ty.sql_type()));
        } else {
            parts.push(format!(
                "{} {} DEFAULT {}",
                quote_ident(&col.name),
                col.ty.sql_type(),
                col.ty.default_literal()
            ));
        }
    }

    let pk: Vec<String> = schema
        .primary_key_columns()
        .map(|c| c.name.clone())
        .collect();
    if !pk.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", quote_cols(&pk)));
    }

    format!(
        "CREATE TABLE {} ({})",
        quote_ident(&schema.name),
        parts.join(", ")
    )
}

fn build_insert_sql(table: &str, columns: &[String], values: &[DbValue]) -> (String, Vec<SqlParam>) {
    if columns.is_empty() {
        // Keyless single-row table with no data fields.
        return (
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table)),
            Vec::new(),
        );
    }

    let cols = quote_cols(columns);
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${}", i)).collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        cols,
        placeholders.join(", ")
    );
    let params = values.iter().map(convert_db_value).collect();

    (sql, params)
}

fn build_update_sql(
    table: &str,
    set_columns: &[(String, DbValue)],
    where_clause: &WhereClause,
) -> (String, Vec<SqlParam>) {
    let mut params = Vec::new();
    let mut param_idx = 1;

    let sets: Vec<String> = set_columns
        .iter()
        .map(|(col, val)| {
            params.push(convert_db_value(val));
            let s = format!("{} = ${}", quote_ident(col), param_idx);
            param_idx += 1;
            s
        })
        .collect();

    let where_str = build_where_sql(where_clause, &mut params, &mut param_idx);

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table),
        sets.join(", "),
        where_str
    );
    (sql, params)
}

fn build_delete_sql(table: &str, where_clause: &WhereClause) -> (String, Vec<SqlParam>) {
    let mut params = Vec::new();
    let mut param_idx = 1;

    let where_str = build_where_sql(where_clause, &mut params, &mut param_idx);

    let sql = format!("DELETE FROM {} WHERE {}", quote_ident(table), where_str);
    (sql, params)
}

fn build_select_sql(table: &str, where_clause: &WhereClause) -> (String, Vec<SqlParam>) {
    let mut params = Vec::new();
    let mut param_idx = 1;

    let where_str = build_where_sql(where_clause, &mut params, &mut param_idx);

    let sql = format!("SELECT * FROM {} WHERE {}", quote_ident(table), where_str);
    (sql, params)
}

fn build_where_sql(
    where_clause: &WhereClause,
    params: &mut Vec<SqlParam>,
    param_idx: &mut usize,
) -> String {
    let parts: Vec<String> = where_clause
        .conditions()
        .into_iter()
        .map(|(col, val)| {
            params.push(convert_db_value(&val));
            let s = format!("{} = ${}", quote_ident(&col), param_idx);
            *param_idx += 1;
            s
        })
        .collect();

    if parts.is_empty() {
        // A keyless table is addressed as a whole.
        "TRUE".to_string()
    } else {
        parts.join(" AND ")
    }
}
