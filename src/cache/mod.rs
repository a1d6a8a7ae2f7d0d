//! The structure-definition cache.
//!
//! A caller registers a contract (connection + interface description), then
//! adds a structure definition for it. The definition is validated and
//! canonicalized, its tables are materialized, the full key space is
//! enumerated and backfilled, and from then on the wired events keep the
//! tables current.

pub mod call;
pub mod enumerate;
pub mod error;
pub mod events;
pub mod join;
pub mod mapping;
pub mod normalize;
pub mod rows;
pub mod schema;
#[cfg(test)]
pub(crate) mod testutil;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

pub use error::CacheError;
pub use events::{CacheOutcome, OutcomeKind};
pub use normalize::{CallSpec, ColumnDef, KeySpec, StructureDefinition, TableSpec};

use crate::client::ContractConnection;
use crate::db::{CacheStore, DbValue};
use crate::types::{DefinitionConfig, InterfaceDescription, Value};

/// One registered contract and its live state.
pub struct ContractRegistration {
    pub name: String,
    pub address: String,
    pub connection: Arc<dyn ContractConnection>,
    pub interface: Arc<InterfaceDescription>,
    pub definition: Option<StructureDefinition>,
    /// Listener tasks for live event subscriptions, aborted on removal.
    listeners: Vec<JoinHandle<()>>,
}

impl Drop for ContractRegistration {
    fn drop(&mut self) {
        for handle in &self.listeners {
            handle.abort();
        }
    }
}

pub(crate) struct CacheInner {
    pub(crate) store: Arc<dyn CacheStore>,
    pub(crate) contracts: RwLock<BTreeMap<String, ContractRegistration>>,
    pub(crate) outcomes: broadcast::Sender<CacheOutcome>,
}

impl CacheInner {
    /// Clone out everything needed to synchronize one table without holding
    /// the registry lock across remote calls.
    pub(crate) async fn table_context(
        &self,
        contract: &str,
        table: &str,
    ) -> Result<(Arc<dyn ContractConnection>, Arc<InterfaceDescription>, TableSpec), CacheError>
    {
        let contracts = self.contracts.read().await;
        let registration = contracts
            .get(contract)
            .ok_or_else(|| CacheError::UnknownContract(contract.to_string()))?;
        let definition = registration
            .definition
            .as_ref()
            .ok_or_else(|| CacheError::UnknownTable {
                contract: contract.to_string(),
                table: table.to_string(),
            })?;
        let spec = definition
            .tables
            .get(table)
            .ok_or_else(|| CacheError::UnknownTable {
                contract: contract.to_string(),
                table: table.to_string(),
            })?
            .clone();
        Ok((
            registration.connection.clone(),
            registration.interface.clone(),
            spec,
        ))
    }
}

/// Relational mirror of remote contract state, kept current by events.
pub struct SqlCache {
    inner: Arc<CacheInner>,
}

impl SqlCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        let (outcomes, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(CacheInner {
                store,
                contracts: RwLock::new(BTreeMap::new()),
                outcomes,
            }),
        }
    }

    /// Register a contract under a unique name.
    pub async fn register_contract(
        &self,
        name: &str,
        address: &str,
        connection: Arc<dyn ContractConnection>,
        interface: InterfaceDescription,
    ) -> Result<(), CacheError> {
        let mut contracts = self.inner.contracts.write().await;
        if contracts.contains_key(name) {
            return Err(CacheError::DuplicateContract(name.to_string()));
        }
        contracts.insert(
            name.to_string(),
            ContractRegistration {
                name: name.to_string(),
                address: address.to_string(),
                connection,
                interface: Arc::new(interface),
                definition: None,
                listeners: Vec::new(),
            },
        );
        tracing::info!("Registered contract '{}' at {}", name, address);
        Ok(())
    }

    /// Remove a contract, tearing down its event subscriptions. Cache tables
    /// are left in place.
    pub async fn unregister_contract(&self, name: &str) -> Result<(), CacheError> {
        let mut contracts = self.inner.contracts.write().await;
        contracts
            .remove(name)
            .ok_or_else(|| CacheError::UnknownContract(name.to_string()))?;
        tracing::info!("Unregistered contract '{}'", name);
        Ok(())
    }

    /// Validate a structure definition, materialize its tables, backfill the
    /// full key space and wire event-driven updates.
    ///
    /// Configuration errors surface before any table is created. Backfill
    /// errors abort and propagate; already-created tables are not rolled
    /// back.
    pub async fn add_definition(
        &self,
        contract: &str,
        config: &DefinitionConfig,
    ) -> Result<(), CacheError> {
        let (connection, interface) = {
            let contracts = self.inner.contracts.read().await;
            let registration = contracts
                .get(contract)
                .ok_or_else(|| CacheError::UnknownContract(contract.to_string()))?;
            if registration.definition.is_some() {
                return Err(CacheError::config(format!(
                    "contract '{}' already has a structure definition",
                    contract
                )));
            }
            (
                registration.connection.clone(),
                registration.interface.clone(),
            )
        };

        let mut definition = normalize::normalize(config, &interface)?;

        for table in definition.tables.values() {
            self.inner
                .store
                .create_table(&schema::table_schema(table))
                .await?;
        }

        let init_seq = definition.init_seq.clone();
        for table in definition.tables.values_mut() {
            backfill_table(
                self.inner.store.as_ref(),
                connection.as_ref(),
                &interface,
                &init_seq,
                table,
            )
            .await?;
        }

        let listeners = events::spawn_listeners(
            &self.inner,
            contract,
            &definition.event_roles,
            &connection,
        )
        .await?;

        let mut contracts = self.inner.contracts.write().await;
        let registration = match contracts.get_mut(contract) {
            Some(registration) => registration,
            None => {
                // Unregistered while the backfill was running.
                for handle in &listeners {
                    handle.abort();
                }
                return Err(CacheError::UnknownContract(contract.to_string()));
            }
        };
        registration.definition = Some(definition);
        registration.listeners.extend(listeners);

        tracing::info!("Structure definition active for contract '{}'", contract);
        Ok(())
    }

    /// Parse a JSON structure definition and add it.
    pub async fn add_definition_json(
        &self,
        contract: &str,
        json: &str,
    ) -> Result<(), CacheError> {
        let config = DefinitionConfig::from_json(json)?;
        self.add_definition(contract, &config).await
    }

    /// Manually re-synchronize one row from the remote accessor.
    pub async fn update(
        &self,
        table: &str,
        contract: &str,
        keys: &[Value],
    ) -> Result<(), CacheError> {
        let (connection, interface, spec) = self.inner.table_context(contract, table).await?;
        rows::update_row(
            self.inner.store.as_ref(),
            connection.as_ref(),
            &interface,
            &spec,
            keys,
        )
        .await
    }

    /// Manually delete one row by key.
    pub async fn remove(
        &self,
        table: &str,
        contract: &str,
        keys: &[Value],
    ) -> Result<(), CacheError> {
        let (_, _, spec) = self.inner.table_context(contract, table).await?;
        rows::remove_row(self.inner.store.as_ref(), &spec, keys).await
    }

    /// Read one cached row.
    pub async fn get(
        &self,
        table: &str,
        contract: &str,
        keys: &[Value],
    ) -> Result<Option<HashMap<String, DbValue>>, CacheError> {
        let (_, _, spec) = self.inner.table_context(contract, table).await?;
        rows::get_row(self.inner.store.as_ref(), &spec, keys).await
    }

    /// Drop a cache table and remove it from the live definition.
    pub async fn drop_table(&self, table: &str, contract: &str) -> Result<(), CacheError> {
        // Validate the table is known before touching the store.
        self.inner.table_context(contract, table).await?;
        self.inner.store.drop_table(table).await?;

        let mut contracts = self.inner.contracts.write().await;
        if let Some(registration) = contracts.get_mut(contract) {
            if let Some(definition) = registration.definition.as_mut() {
                definition.tables.remove(table);
            }
        }
        Ok(())
    }

    /// Observable stream of update/remove outcomes from event handling.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<CacheOutcome> {
        self.inner.outcomes.subscribe()
    }

    /// Snapshot of a table's normalized spec, including the enumerated
    /// `key_order`/`key_set` once backfill has run.
    pub async fn table_spec(&self, table: &str, contract: &str) -> Result<TableSpec, CacheError> {
        let (_, _, spec) = self.inner.table_context(contract, table).await?;
        Ok(spec)
    }
}

/// Enumerate a table's key space path by path, join the parts, and populate
/// every row. Strictly serial: one remote call and one in-flight row at a
/// time, in a fixed traversal order.
async fn backfill_table(
    store: &dyn CacheStore,
    connection: &dyn ContractConnection,
    interface: &InterfaceDescription,
    init_seq: &BTreeMap<String, KeySpec>,
    table: &mut TableSpec,
) -> Result<(), CacheError> {
    let mut parts = Vec::with_capacity(table.paths.len());
    for path in &table.paths {
        parts.push(enumerate::enumerate_path(connection, interface, init_seq, path).await?);
    }

    let (key_order, key_set) = join::join_key_sets(parts);
    table.key_order = key_order;
    table.key_set = key_set;

    // The accessor takes keys in declaration order, which may differ from
    // the enumerated column order once paths are joined.
    let positions: Vec<usize> = table
        .keys
        .iter()
        .map(|key| {
            table
                .key_order
                .iter()
                .position(|k| k == key)
                .ok_or_else(|| {
                    CacheError::config(format!(
                        "tables.{}: key '{}' missing from enumerated key order",
                        table.name, key
                    ))
                })
        })
        .collect::<Result<_, _>>()?;

    tracing::info!(
        "Backfilling table '{}': {} row(s)",
        table.name,
        table.key_set.len()
    );

    for tuple in &table.key_set {
        let keys: Vec<Value> = positions.iter().map(|&i| tuple[i].clone()).collect();
        rows::update_row(store, connection, interface, table, &keys).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testutil::{test_interface, MockConnection};
    use crate::db::MemoryStore;

    const DEFINITION: &str = r#"{
        "initSeq": {
            "group": { "len": { "call": "getCount", "field": "count" } },
            "item": { "len": "getItemCount", "dependent": "group" }
        },
        "tables": {
            "groups": { "call": "getGroupData" },
            "items": { "call": "getItemData", "keys": ["group", "item"] }
        }
    }"#;

    fn scripted_connection() -> MockConnection {
        MockConnection::new()
            .with_result("getCount", vec![Value::Uint(2)])
            .with_queued(
                "getItemCount",
                vec![vec![Value::Uint(2)], vec![Value::Uint(1)]],
            )
            .with_result(
                "getGroupData",
                vec![Value::String("owner".to_string()), Value::Bool(true)],
            )
            .with_result(
                "getItemData",
                vec![Value::String("label".to_string()), Value::Bool(true)],
            )
    }

    async fn cache_with_definition(
        conn: Arc<MockConnection>,
    ) -> (SqlCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cache = SqlCache::new(store.clone());
        cache
            .register_contract("agreements", "0x01", conn, test_interface())
            .await
            .unwrap();
        cache
            .add_definition_json("agreements", DEFINITION)
            .await
            .unwrap();
        (cache, store)
    }

    #[tokio::test]
    async fn test_backfill_populates_all_tables() {
        let conn = Arc::new(scripted_connection());
        let (cache, store) = cache_with_definition(conn.clone()).await;

        // Two groups.
        assert_eq!(store.row_count("groups").await.unwrap(), 2);
        // Group 0 has two items, group 1 has one.
        assert_eq!(store.row_count("items").await.unwrap(), 3);

        let groups = cache.table_spec("groups", "agreements").await.unwrap();
        assert_eq!(groups.key_order, vec!["group"]);
        assert_eq!(
            groups.key_set,
            vec![vec![Value::Uint(0)], vec![Value::Uint(1)]]
        );

        let items = cache.table_spec("items", "agreements").await.unwrap();
        assert_eq!(items.key_order, vec!["group", "item"]);
        assert_eq!(items.key_set.len(), 3);
        assert!(items.key_set.iter().all(|t| t.len() == 2));

        // Each enumerated row was read through the accessor once.
        assert_eq!(conn.calls_to("getGroupData").len(), 2);
        assert_eq!(conn.calls_to("getItemData").len(), 3);
    }

    #[tokio::test]
    async fn test_backfill_rows_hold_accessor_data() {
        let conn = Arc::new(scripted_connection());
        let (cache, _) = cache_with_definition(conn).await;

        let row = cache
            .get("groups", "agreements", &[Value::Uint(1)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("owner"), Some(&DbValue::Text("owner".to_string())));
        assert_eq!(row.get("active"), Some(&DbValue::Bool(true)));
        assert_eq!(row.get("group"), Some(&DbValue::Int64(1)));
    }

    #[tokio::test]
    async fn test_duplicate_contract_rejected() {
        let store = Arc::new(MemoryStore::new());
        let cache = SqlCache::new(store);
        let conn = Arc::new(MockConnection::new());

        cache
            .register_contract("a", "0x01", conn.clone(), test_interface())
            .await
            .unwrap();
        assert!(matches!(
            cache
                .register_contract("a", "0x02", conn, test_interface())
                .await,
            Err(CacheError::DuplicateContract(_))
        ));
    }

    #[tokio::test]
    async fn test_config_error_creates_no_tables() {
        let store = Arc::new(MemoryStore::new());
        let cache = SqlCache::new(store.clone());
        let conn = Arc::new(MockConnection::new());
        cache
            .register_contract("agreements", "0x01", conn, test_interface())
            .await
            .unwrap();

        let bad = r#"{
            "initSeq": { "group": { "len": "noSuchFunction" } },
            "tables": { "groups": { "call": "getGroupData" } }
        }"#;
        assert!(cache.add_definition_json("agreements", bad).await.is_err());
        assert!(store.row_count("groups").await.is_err());
    }

    #[tokio::test]
    async fn test_update_event_reroutes_to_accessor() {
        let conn = Arc::new(scripted_connection());
        let (cache, store) = cache_with_definition(conn.clone()).await;
        let mut outcomes = cache.subscribe_outcomes();

        // A new item appears in group 1.
        conn.emit(
            "LogItemUpdate",
            vec![
                Value::String("items".to_string()),
                Value::Uint(1),
                Value::Uint(1),
            ],
        )
        .await;

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Update);
        assert_eq!(outcome.table, "items");
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.keys, vec![Value::Uint(1), Value::Uint(1)]);

        assert_eq!(store.row_count("items").await.unwrap(), 4);
        // The accessor received exactly the two event keys.
        let last_call = conn.calls_to("getItemData").pop().unwrap();
        assert_eq!(last_call, vec![Value::Uint(1), Value::Uint(1)]);
    }

    #[tokio::test]
    async fn test_remove_event_deletes_row() {
        let conn = Arc::new(scripted_connection());
        let (cache, store) = cache_with_definition(conn.clone()).await;
        let mut outcomes = cache.subscribe_outcomes();

        conn.emit(
            "LogItemRemoval",
            vec![
                Value::String("items".to_string()),
                Value::Uint(0),
                Value::Uint(0),
            ],
        )
        .await;

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Remove);
        assert_eq!(outcome.error, None);
        assert_eq!(store.row_count("items").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_event_error_surfaces_on_outcome_stream() {
        let conn = Arc::new(scripted_connection());
        let (cache, _) = cache_with_definition(conn.clone()).await;
        let mut outcomes = cache.subscribe_outcomes();

        conn.emit(
            "LogItemUpdate",
            vec![
                Value::String("no_such_table".to_string()),
                Value::Uint(0),
                Value::Uint(0),
            ],
        )
        .await;

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.table, "no_such_table");
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_explicit_role_map_limits_subscriptions() {
        let conn = Arc::new(scripted_connection());
        let store = Arc::new(MemoryStore::new());
        let cache = SqlCache::new(store);
        cache
            .register_contract("agreements", "0x01", conn.clone(), test_interface())
            .await
            .unwrap();

        let definition = r#"{
            "initSeq": {
                "group": { "len": { "call": "getCount", "field": "count" } },
                "item": { "len": "getItemCount", "dependent": "group" }
            },
            "tables": {
                "items": { "call": "getItemData", "keys": ["group", "item"] }
            },
            "events": { "LogItemUpdate": "update" }
        }"#;
        cache
            .add_definition_json("agreements", definition)
            .await
            .unwrap();

        assert_eq!(conn.subscribed_events(), vec!["LogItemUpdate".to_string()]);
    }

    #[tokio::test]
    async fn test_manual_update_and_remove() {
        let conn = Arc::new(scripted_connection());
        let (cache, store) = cache_with_definition(conn.clone()).await;

        cache
            .update("items", "agreements", &[Value::Uint(1), Value::Uint(5)])
            .await
            .unwrap();
        assert_eq!(store.row_count("items").await.unwrap(), 4);

        cache
            .remove("items", "agreements", &[Value::Uint(1), Value::Uint(5)])
            .await
            .unwrap();
        assert_eq!(store.row_count("items").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_drop_table_removes_spec() {
        let conn = Arc::new(scripted_connection());
        let (cache, store) = cache_with_definition(conn).await;

        cache.drop_table("items", "agreements").await.unwrap();
        assert!(store.row_count("items").await.is_err());
        assert!(matches!(
            cache.table_spec("items", "agreements").await,
            Err(CacheError::UnknownTable { .. })
        ));
    }

    #[tokio::test]
    async fn test_unregister_tears_down_subscriptions() {
        let conn = Arc::new(scripted_connection());
        let (cache, _) = cache_with_definition(conn.clone()).await;

        cache.unregister_contract("agreements").await.unwrap();
        assert!(matches!(
            cache.update("items", "agreements", &[]).await,
            Err(CacheError::UnknownContract(_))
        ));
    }
}
