//! Store connectors.
//!
//! A connector produces the store handle for a named queue. The engine
//! never creates connections itself; callers pass a connector (or a plain
//! closure) and keep ownership of whatever it opens.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{InMemoryQueueStore, QueueStore, StoreError, StoreOptions};

/// Opens a queue store for a queue name.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Connect to `queue`, interpreting `options` as the backend sees fit.
    async fn connect(
        &self,
        queue: &str,
        options: &StoreOptions,
    ) -> Result<Arc<dyn QueueStore>, StoreError>;
}

#[async_trait]
impl<F> StoreConnector for F
where
    F: Fn(&str, &StoreOptions) -> Result<Arc<dyn QueueStore>, StoreError> + Send + Sync,
{
    async fn connect(
        &self,
        queue: &str,
        options: &StoreOptions,
    ) -> Result<Arc<dyn QueueStore>, StoreError> {
        self(queue, options)
    }
}

/// Registry of in-memory queues.
///
/// Connecting twice to the same queue name yields the same store, so state
/// survives between reconciliations the way a server-backed queue would.
#[derive(Default)]
pub struct InMemoryConnector {
    queues: RwLock<HashMap<String, Arc<InMemoryQueueStore>>>,
}

impl InMemoryConnector {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the store for `queue`.
    pub fn queue(&self, queue: &str) -> Result<Arc<InMemoryQueueStore>, StoreError> {
        if let Some(store) = self
            .queues
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(queue)
        {
            return Ok(Arc::clone(store));
        }

        let mut queues = self.queues.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Arc::clone(
            queues
                .entry(queue.to_string())
                .or_insert_with(|| Arc::new(InMemoryQueueStore::new())),
        ))
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn connect(
        &self,
        queue: &str,
        _options: &StoreOptions,
    ) -> Result<Arc<dyn QueueStore>, StoreError> {
        let store: Arc<dyn QueueStore> = self.queue(queue)?;
        Ok(store)
    }
}

/// Connector that picks a backend from the `backend` option.
///
/// - `memory` (default): an in-process queue, shared per queue name.
/// - `sqlite`: a SQLite file named by `path` (requires the `sqlite` feature).
#[derive(Default)]
pub struct BackendConnector {
    memory: InMemoryConnector,
}

impl BackendConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreConnector for BackendConnector {
    async fn connect(
        &self,
        queue: &str,
        options: &StoreOptions,
    ) -> Result<Arc<dyn QueueStore>, StoreError> {
        match options.get_str("backend").unwrap_or("memory") {
            "memory" => self.memory.connect(queue, options).await,
            #[cfg(feature = "sqlite")]
            "sqlite" => super::SqliteConnector.connect(queue, options).await,
            other => Err(StoreError::InvalidOptions(format!(
                "unknown backend '{}'",
                other
            ))),
        }
    }
}
