//! Offline replay of recorded histories against current workflow code.
//!
//! Histories exported from the server (JSON through the CLI or UI, binary
//! through the API) are fed through a [`WorkflowExecutor`] exactly as a
//! worker would on a cache miss. A replay that issues commands history did
//! not record, or skips ones it did, fails with a [`ReplayError`] before the
//! change ever reaches a running workflow.

use crate::config::ExecutorConfig;
use crate::worker::executor::WorkflowExecutor;
use crate::worker::registry::WorkflowRegistry;
use crate::workflow::definition::WorkflowDefinition;
use crate::workflow::failure::ErrorRegistry;
use crate::workflow::metadata::WorkflowMetadata;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use weft_core::{
    history_from_json, history_from_protobuf, ClientError, CoreError, EventType, History,
    InternalError, NonDeterminismError,
};

const REPLAY_NAMESPACE: &str = "replay-test";
const REPLAY_WORKFLOW_ID: &str = "workflow_id";
const REPLAY_RUN_ID: &str = "run_id";

/// Why a replay test failed
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("History does not start with workflow_execution_started event")]
    MissingStartEvent,

    /// The run went past the end of history
    #[error("Workflow task is issuing new commands when it should complete: [{}]", .commands.join(", "))]
    NewCommands { commands: Vec<String> },

    /// The executor failed while replaying
    #[error("Workflow code failed to replay successfully against history: {source}")]
    Failed {
        source: CoreError,
        /// Where workflow code was suspended when replay failed
        stack_trace: Option<String>,
    },

    /// The history could not be loaded
    #[error("Could not load history: {0}")]
    InvalidHistory(#[source] CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl ReplayError {
    /// The divergence between code and history, if that is what failed
    pub fn non_determinism(&self) -> Option<&NonDeterminismError> {
        match self {
            Self::Failed {
                source: CoreError::Internal(InternalError::NonDeterministicWorkflow(e)),
                ..
            } => Some(e),
            _ => None,
        }
    }

    pub fn stack_trace(&self) -> Option<&str> {
        match self {
            Self::Failed { stack_trace, .. } => stack_trace.as_deref(),
            _ => None,
        }
    }
}

/// Replays histories against registered workflows.
///
/// The workflow to run is looked up by the workflow type recorded in the
/// history's first event.
///
/// # Example
///
/// ```ignore
/// let tester = ReplayTester::for_workflow(OrderWorkflow)?;
/// tester.replay_history_json(include_str!("histories/order.json"))?;
/// ```
#[derive(Debug)]
pub struct ReplayTester {
    registry: Arc<WorkflowRegistry>,
    config: ExecutorConfig,
    errors: Arc<ErrorRegistry>,
}

impl ReplayTester {
    pub fn new(registry: Arc<WorkflowRegistry>) -> Self {
        Self {
            registry,
            config: ExecutorConfig {
                capture_stack_trace: true,
                ..ExecutorConfig::DEFAULT
            },
            errors: Arc::new(ErrorRegistry::new()),
        }
    }

    /// Tester for a single workflow definition
    pub fn for_workflow<W>(workflow: W) -> Result<Self, ClientError>
    where
        W: WorkflowDefinition + 'static,
    {
        let registry = WorkflowRegistry::new();
        registry.register(workflow)?;
        Ok(Self::new(Arc::new(registry)))
    }

    /// Replay with a different executor configuration. Stack traces stay on.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = ExecutorConfig {
            capture_stack_trace: true,
            ..config
        };
        self
    }

    pub fn with_error_registry(mut self, errors: Arc<ErrorRegistry>) -> Self {
        self.errors = errors;
        self
    }

    /// Replay a JSON history document.
    ///
    /// Histories exported with PascalCase event type names need
    /// [`correct_event_types`](weft_core::correct_event_types) first.
    pub fn replay_history_json(&self, json: &str) -> Result<(), ReplayError> {
        let history = history_from_json(json).map_err(ReplayError::InvalidHistory)?;
        self.replay_history(history)
    }

    pub fn replay_history_json_file(&self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        let json = std::fs::read_to_string(path)?;
        self.replay_history_json(&json)
    }

    /// Replay a binary (protobuf) history
    pub fn replay_history_protobuf(&self, bytes: &[u8]) -> Result<(), ReplayError> {
        let history = history_from_protobuf(bytes).map_err(ReplayError::InvalidHistory)?;
        self.replay_history(history)
    }

    pub fn replay_history_protobuf_file(&self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        let bytes = std::fs::read(path)?;
        self.replay_history_protobuf(&bytes)
    }

    /// Replay a parsed history, succeeding when the code reproduces it exactly
    pub fn replay_history(&self, history: History) -> Result<(), ReplayError> {
        let workflow_type = match history.first_event() {
            Some(event) if event.event_type() == EventType::WorkflowExecutionStarted => event
                .get("workflowType")
                .and_then(|t| t.get("name"))
                .and_then(|name| name.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => return Err(ReplayError::MissingStartEvent),
        };

        let workflow = self.registry.resolve(&workflow_type)?;
        let metadata = WorkflowMetadata::new(&workflow_type, REPLAY_WORKFLOW_ID, REPLAY_RUN_ID)
            .with_namespace(REPLAY_NAMESPACE);

        let mut executor = WorkflowExecutor::new(
            workflow,
            history,
            metadata,
            self.config.clone(),
            Arc::clone(&self.errors),
        )
        .map_err(ReplayError::InvalidHistory)?;

        let result = executor.run().map_err(|source| {
            let stack_trace = executor.stack_trace();
            warn!(error = %source, "Replay failed");
            ReplayError::Failed { source, stack_trace }
        })?;

        if !result.commands.is_empty() {
            return Err(ReplayError::NewCommands {
                commands: result.commands.iter().map(|c| c.kind().to_string()).collect(),
            });
        }

        debug!(%workflow_type, "Replay succeeded");
        Ok(())
    }
}
