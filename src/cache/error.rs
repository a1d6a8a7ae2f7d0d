//! Cache error types.

use thiserror::Error;

use crate::client::ConnectionError;
use crate::db::DbError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid structure definition: {0}")]
    Config(String),

    #[error("Structure definition parse error: {0}")]
    Definition(#[from] serde_json::Error),

    #[error("Function '{function}' not found in interface ({context})")]
    UnknownFunction { function: String, context: String },

    #[error("Function '{function}' is ambiguous: {count} declarations ({context})")]
    AmbiguousFunction {
        function: String,
        count: usize,
        context: String,
    },

    #[error("Function '{function}' expects {expected} argument(s), got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("Function '{function}' has no output field '{field}' ({context})")]
    MissingField {
        function: String,
        field: String,
        context: String,
    },

    #[error("Key '{key}' declares unknown dependent key '{dependent}'")]
    UnknownDependency { key: String, dependent: String },

    #[error("Table '{table}' requires key '{key}' but no such key is defined in initSeq")]
    UnknownKey { table: String, key: String },

    #[error("Contract '{0}' is already registered")]
    DuplicateContract(String),

    #[error("Contract '{0}' is not registered")]
    UnknownContract(String),

    #[error("No cache table '{table}' for contract '{contract}'")]
    UnknownTable { contract: String, table: String },

    #[error("Table '{table}' requires {expected} key(s), got {got}")]
    InsufficientKeys {
        table: String,
        expected: usize,
        got: usize,
    },

    #[error("Unexpected value from '{context}': {message}")]
    Value { context: String, message: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl CacheError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn value(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Value {
            context: context.into(),
            message: message.into(),
        }
    }
}
