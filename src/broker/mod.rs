//! # Broker Abstraction Module
//!
//! This module defines the capability contract every messaging backend must
//! satisfy so that the benchmark scenarios stay backend-agnostic. A backend
//! only needs three operations:
//!
//! - **publish**: accept a message for every current subscriber of a topic
//! - **subscribe**: register a handler invoked once per delivered message
//! - **close**: release delivery tasks and queues (idempotent)
//!
//! Delivery is asynchronous. A successful `publish` only means the message was
//! accepted, not that any handler has run yet.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod in_process;

pub use in_process::InProcessBroker;

/// Immutable message payload shared between every subscription it fans out to
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    payload: Arc<[u8]>,
}

impl Message {
    /// Create a message from raw bytes
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = payload.into();
        Self {
            payload: Arc::from(bytes),
        }
    }

    /// Create the index-marker payload the scenarios publish
    pub fn indexed(index: usize) -> Self {
        Self::new(format!("Message {}", index))
    }

    /// Get the payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("len", &self.payload.len())
            .finish()
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }
}

/// Side-effecting callback invoked once per delivered message
pub type Handler = Arc<dyn Fn(Message) + Send + Sync>;

/// Wrap a closure as a subscription handler
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(Message) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Errors returned by broker contract operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker has been closed; every publish/subscribe fails from now on
    #[error("broker is closed")]
    Closed,

    /// A push was aborted because the broker started shutting down
    #[error("broker is closing")]
    Closing,

    /// Backend-specific failure (connection loss, protocol error, ...)
    #[error("backend error: {0}")]
    Backend(String),
}

/// Generic publish/subscribe interface implemented by every backend
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue `message` for delivery to all current subscribers of `topic`.
    ///
    /// Publishing to a topic with no subscribers is a successful no-op.
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BrokerError>;

    /// Register `handler` for every subsequent message published to `topic`
    async fn subscribe(&self, topic: &str, handler: Handler) -> Result<(), BrokerError>;

    /// Close the broker. Repeated calls are no-ops returning `Ok`.
    async fn close(&self) -> Result<(), BrokerError>;

    /// Get backend name for identification
    fn name(&self) -> &'static str;
}

/// Broker factory for creating fresh broker instances per scenario
pub struct BrokerFactory;

impl BrokerFactory {
    /// Create a new broker instance for the given backend
    pub fn create(backend: &crate::cli::Backend, queue_capacity: usize) -> Arc<dyn Broker> {
        use crate::cli::Backend;

        match backend {
            Backend::Mono => Arc::new(InProcessBroker::with_capacity(queue_capacity)),
        }
    }
}
