//! Query handlers registered by workflow code.

use crate::error::WorkflowError;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Handler answering a query from the current workflow state
pub type QueryHandler = Arc<dyn Fn(Value) -> Result<Value, WorkflowError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Workflow did not register a handler for '{query_type}'. KnownQueryTypes=[{}]", known.join(", "))]
    UnknownQueryType { query_type: String, known: Vec<String> },

    #[error("Query '{query_type}' failed: {source}")]
    HandlerFailed {
        query_type: String,
        #[source]
        source: WorkflowError,
    },
}

/// Query handlers in registration order
#[derive(Default)]
pub struct QueryRegistry {
    handlers: Mutex<Vec<(String, QueryHandler)>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type
    pub fn register<F>(&self, query_type: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Result<Value, WorkflowError> + Send + Sync + 'static,
    {
        let query_type = query_type.into();
        let handler: QueryHandler = Arc::new(handler);
        let mut handlers = self.handlers.lock();

        match handlers.iter_mut().find(|(name, _)| *name == query_type) {
            Some(entry) => {
                warn!(query_type = %query_type, "Query handler overwritten");
                entry.1 = handler;
            }
            None => handlers.push((query_type, handler)),
        }
    }

    pub fn known_query_types(&self) -> Vec<String> {
        self.handlers.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn handle(&self, query_type: &str, args: Value) -> Result<Value, QueryError> {
        let handler = self
            .handlers
            .lock()
            .iter()
            .find(|(name, _)| name == query_type)
            .map(|(_, handler)| Arc::clone(handler));

        let Some(handler) = handler else {
            return Err(QueryError::UnknownQueryType {
                query_type: query_type.to_string(),
                known: self.known_query_types(),
            });
        };

        handler(args).map_err(|source| QueryError::HandlerFailed {
            query_type: query_type.to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for QueryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRegistry")
            .field("query_types", &self.known_query_types())
            .finish()
    }
}
