pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use error::DbError;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use store::CacheStore;
pub use types::{ColumnSchema, ColumnType, DbOperation, DbValue, TableSchema, WhereClause};
