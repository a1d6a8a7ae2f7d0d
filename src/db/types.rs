/// A value bound into a SQL statement or read back from a row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DbValue {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 64-bit integer (BIGINT)
    Int64(i64),
    /// Text (unlimited length)
    Text(String),
    /// Raw bytes (BYTEA)
    Bytes(Vec<u8>),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }
}

/// Column type of a cache table, as derived by the field-type mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Boolean,
    Bytea,
    Text,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::BigInt => "BIGINT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Bytea => "BYTEA",
            ColumnType::Text => "TEXT",
        }
    }

    /// Default literal for non-key columns.
    pub fn default_literal(&self) -> &'static str {
        match self {
            ColumnType::BigInt => "0",
            ColumnType::Boolean => "FALSE",
            ColumnType::Bytea => "'\\x'",
            ColumnType::Text => "''",
        }
    }

    /// Default value as a DbValue, used by stores that do not interpret
    /// SQL literals.
    pub fn default_value(&self) -> DbValue {
        match self {
            ColumnType::BigInt => DbValue::Int64(0),
            ColumnType::Boolean => DbValue::Bool(false),
            ColumnType::Bytea => DbValue::Bytes(Vec::new()),
            ColumnType::Text => DbValue::Text(String::new()),
        }
    }
}

/// One column of a cache table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub ty: ColumnType,
    /// Key columns compose the primary key and carry no default.
    pub primary_key: bool,
}

/// Schema of one cache table: key columns first, then value columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

/// Database operation issued by the row synchronizer.
#[derive(Debug, Clone)]
pub enum DbOperation {
    /// Simple INSERT
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
    },
    /// UPDATE with WHERE clause
    Update {
        table: String,
        set_columns: Vec<(String, DbValue)>,
        where_clause: WhereClause,
    },
    /// DELETE with WHERE clause
    Delete {
        table: String,
        where_clause: WhereClause,
    },
}

/// WHERE clause for row lookups, updates and deletes.
#[derive(Debug, Clone)]
pub enum WhereClause {
    /// column = value
    Eq(String, DbValue),
    /// column1 = value1 AND column2 = value2 AND ...
    And(Vec<(String, DbValue)>),
}

impl WhereClause {
    pub fn conditions(&self) -> Vec<(String, DbValue)> {
        match self {
            WhereClause::Eq(col, val) => vec![(col.clone(), val.clone())],
            WhereClause::And(conds) => conds.clone(),
        }
    }
}
