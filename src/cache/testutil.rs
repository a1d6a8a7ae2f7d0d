//! Shared test doubles: a scripted contract connection and an interface
//! fixture shaped like the agreement contracts this cache fronts.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::client::{ConnectionError, ContractConnection, EventNotification};
use crate::types::{
    EventDescription, FunctionDescription, InterfaceDescription, TypedField, Value, ValueType,
};

/// Scripted in-memory contract connection.
///
/// `with_result` installs a fixed response for a function; `with_queued`
/// installs per-call responses consumed front to back (falling back to the
/// fixed response once exhausted). Every call is recorded for assertions.
#[derive(Default)]
pub struct MockConnection {
    fixed: HashMap<String, Vec<Value>>,
    queued: Mutex<HashMap<String, VecDeque<Vec<Value>>>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    events: Mutex<HashMap<String, mpsc::Sender<EventNotification>>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, function: &str, outputs: Vec<Value>) -> Self {
        self.fixed.insert(function.to_string(), outputs);
        self
    }

    pub fn with_queued(self, function: &str, responses: Vec<Vec<Value>>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .insert(function.to_string(), responses.into());
        self
    }

    /// All calls made so far, as (function, args).
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, function: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(f, _)| f == function)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Deliver an event notification to an active subscription.
    pub async fn emit(&self, event: &str, args: Vec<Value>) {
        let sender = {
            let events = self.events.lock().unwrap();
            events.get(event).cloned()
        };
        let sender = sender.unwrap_or_else(|| panic!("no subscription for event '{}'", event));
        sender
            .send(EventNotification {
                event: event.to_string(),
                args,
            })
            .await
            .expect("subscription receiver dropped");
    }

    pub fn subscribed_events(&self) -> Vec<String> {
        self.events.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ContractConnection for MockConnection {
    async fn call(&self, function: &str, args: &[Value]) -> Result<Vec<Value>, ConnectionError> {
        self.calls
            .lock()
            .unwrap()
            .push((function.to_string(), args.to_vec()));

        if let Some(queue) = self.queued.lock().unwrap().get_mut(function) {
            if let Some(response) = queue.pop_front() {
                return Ok(response);
            }
        }

        self.fixed
            .get(function)
            .cloned()
            .ok_or_else(|| ConnectionError::Call {
                function: function.to_string(),
                message: "no scripted result".to_string(),
            })
    }

    async fn subscribe(
        &self,
        event: &str,
    ) -> Result<mpsc::Receiver<EventNotification>, ConnectionError> {
        let (tx, rx) = mpsc::channel(16);
        self.events.lock().unwrap().insert(event.to_string(), tx);
        Ok(rx)
    }
}

/// Interface fixture: a group collection with per-group items.
pub fn test_interface() -> InterfaceDescription {
    InterfaceDescription {
        functions: vec![
            FunctionDescription {
                name: "getCount".to_string(),
                inputs: vec![],
                outputs: vec![TypedField::new("count", ValueType::Int)],
            },
            FunctionDescription {
                name: "getBounds".to_string(),
                inputs: vec![],
                outputs: vec![
                    TypedField::new("lo", ValueType::Int),
                    TypedField::new("hi", ValueType::Int),
                ],
            },
            FunctionDescription {
                name: "getItemCount".to_string(),
                inputs: vec![TypedField::new("group", ValueType::Int)],
                outputs: vec![TypedField::new("count", ValueType::Int)],
            },
            FunctionDescription {
                name: "getItemAtIndex".to_string(),
                inputs: vec![
                    TypedField::new("group", ValueType::Int),
                    TypedField::new("index", ValueType::Int),
                ],
                outputs: vec![TypedField::new("item", ValueType::Int)],
            },
            FunctionDescription {
                name: "getGroupData".to_string(),
                inputs: vec![TypedField::new("group", ValueType::Int)],
                outputs: vec![
                    TypedField::new("owner", ValueType::String),
                    TypedField::new("active", ValueType::Bool),
                ],
            },
            FunctionDescription {
                name: "getItemData".to_string(),
                inputs: vec![
                    TypedField::new("group", ValueType::Int),
                    TypedField::new("item", ValueType::Int),
                ],
                outputs: vec![
                    TypedField::new("label", ValueType::String),
                    TypedField::new("exists", ValueType::Bool),
                ],
            },
        ],
        events: vec![
            EventDescription {
                name: "LogGroupUpdate".to_string(),
                fields: vec![
                    TypedField::new("table", ValueType::String),
                    TypedField::new("group", ValueType::Int),
                ],
            },
            EventDescription {
                name: "LogItemUpdate".to_string(),
                fields: vec![
                    TypedField::new("table", ValueType::String),
                    TypedField::new("group", ValueType::Int),
                    TypedField::new("item", ValueType::Int),
                ],
            },
            EventDescription {
                name: "LogItemRemoval".to_string(),
                fields: vec![
                    TypedField::new("table", ValueType::String),
                    TypedField::new("group", ValueType::Int),
                    TypedField::new("item", ValueType::Int),
                ],
            },
        ],
    }
}
