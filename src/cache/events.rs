//! Event-driven incremental updates.
//!
//! Each wired event gets its own subscription and listener task. A
//! notification's ordered field values flatten into `[table, key...]`; the
//! role decides whether the row is re-read from the accessor or deleted.
//! Listener failures are logged and reported on the outcome stream; the
//! notification source cannot accept a failure signal.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::CacheError;
use super::rows;
use super::CacheInner;
use crate::client::{ContractConnection, EventNotification};
use crate::types::definition::EventRole;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Update,
    Remove,
}

/// One entry on the observable outcome stream.
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub kind: OutcomeKind,
    pub contract: String,
    pub table: String,
    pub keys: Vec<Value>,
    pub error: Option<String>,
}

/// Subscribe to every role-mapped event of a contract and spawn one listener
/// task per subscription. Returns the task handles so deregistration can
/// abort them.
pub(crate) async fn spawn_listeners(
    inner: &Arc<CacheInner>,
    contract: &str,
    roles: &std::collections::BTreeMap<String, EventRole>,
    connection: &Arc<dyn ContractConnection>,
) -> Result<Vec<JoinHandle<()>>, CacheError> {
    if !roles.values().any(|role| *role == EventRole::Update) {
        tracing::warn!(
            "Contract '{}' has no update events wired; its cache will not receive \
             incremental updates",
            contract
        );
    }

    let mut handles = Vec::with_capacity(roles.len());
    for (event, role) in roles {
        let receiver = connection.subscribe(event).await?;
        tracing::info!(
            "Subscribed to event '{}' on contract '{}' as {:?}",
            event,
            contract,
            role
        );
        handles.push(tokio::spawn(listen(
            inner.clone(),
            contract.to_string(),
            *role,
            receiver,
        )));
    }

    Ok(handles)
}

async fn listen(
    inner: Arc<CacheInner>,
    contract: String,
    role: EventRole,
    mut receiver: mpsc::Receiver<EventNotification>,
) {
    while let Some(notification) = receiver.recv().await {
        handle_notification(&inner, &contract, role, notification).await;
    }
}

/// Process one notification and emit an outcome. Never returns an error.
async fn handle_notification(
    inner: &Arc<CacheInner>,
    contract: &str,
    role: EventRole,
    notification: EventNotification,
) {
    let kind = match role {
        EventRole::Update => OutcomeKind::Update,
        EventRole::Remove => OutcomeKind::Remove,
    };

    // Flattened event arguments: table name first, then the key tuple.
    let (table, keys) = match notification.args.split_first() {
        Some((Value::String(table), keys)) => (table.clone(), keys.to_vec()),
        _ => {
            tracing::warn!(
                "Event '{}' on contract '{}' did not carry a table name; ignoring",
                notification.event,
                contract
            );
            emit(
                inner,
                CacheOutcome {
                    kind,
                    contract: contract.to_string(),
                    table: String::new(),
                    keys: notification.args,
                    error: Some("event carried no table name".to_string()),
                },
            );
            return;
        }
    };

    let result = route(inner, contract, &table, role, &keys).await;
    let error = result.err().map(|e| {
        tracing::warn!(
            "Event '{}' handling failed for table '{}' on contract '{}': {}",
            notification.event,
            table,
            contract,
            e
        );
        e.to_string()
    });

    emit(
        inner,
        CacheOutcome {
            kind,
            contract: contract.to_string(),
            table,
            keys,
            error,
        },
    );
}

async fn route(
    inner: &Arc<CacheInner>,
    contract: &str,
    table: &str,
    role: EventRole,
    keys: &[Value],
) -> Result<(), CacheError> {
    let (connection, interface, table_spec) = inner.table_context(contract, table).await?;

    match role {
        EventRole::Update => {
            rows::update_row(
                inner.store.as_ref(),
                connection.as_ref(),
                &interface,
                &table_spec,
                keys,
            )
            .await
        }
        EventRole::Remove => rows::remove_row(inner.store.as_ref(), &table_spec, keys).await,
    }
}

fn emit(inner: &Arc<CacheInner>, outcome: CacheOutcome) {
    // No receivers is fine; outcomes are best-effort observability.
    let _ = inner.outcomes.send(outcome);
}
