//! Seam to the remote execution engine.
//!
//! The engine offers exactly two capabilities: invoking one function at a
//! time and subscribing to named events. `ContractConnection` captures that
//! surface; the transport (and any retry/timeout policy) lives behind it.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::Value;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Call to '{function}' failed: {message}")]
    Call { function: String, message: String },

    #[error("Subscription to '{event}' failed: {message}")]
    Subscribe { event: String, message: String },
}

/// One event notification delivered by a subscription.
#[derive(Debug, Clone)]
pub struct EventNotification {
    pub event: String,
    /// Ordered field values as declared in the interface description.
    pub args: Vec<Value>,
}

/// Handle to one remote contract.
#[async_trait]
pub trait ContractConnection: Send + Sync {
    /// Invoke a function with positional arguments and return its ordered
    /// output values.
    async fn call(&self, function: &str, args: &[Value]) -> Result<Vec<Value>, ConnectionError>;

    /// Subscribe to an event. Notifications arrive serially on the returned
    /// channel; dropping the receiver ends the subscription.
    async fn subscribe(
        &self,
        event: &str,
    ) -> Result<mpsc::Receiver<EventNotification>, ConnectionError>;
}
