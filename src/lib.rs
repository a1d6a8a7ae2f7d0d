//! Generic relational cache synchronizer for remote contract state.
//!
//! The remote execution engine exposes per-function calls and event
//! subscriptions only, no queries. Given a contract's interface
//! description, a declarative structure definition and a key-derivation
//! recipe per key column, this crate builds a fully queryable relational
//! mirror of that state and keeps it current as events arrive.

pub mod cache;
pub mod client;
pub mod db;
pub mod types;

pub use cache::{CacheError, CacheOutcome, OutcomeKind, SqlCache, StructureDefinition, TableSpec};
pub use client::{ConnectionError, ContractConnection, EventNotification};
pub use db::{CacheStore, DbError, DbValue, MemoryStore, PostgresStore};
pub use types::{DefinitionConfig, EventRole, InterfaceDescription, Value, ValueType};
