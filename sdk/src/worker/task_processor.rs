//! WorkflowTaskProcessor - turns a workflow task into a response
//!
//! Polling the server and reporting the response are left to the caller.

use crate::config::WorkerConfig;
use crate::worker::executor::{QueryResult, WorkflowExecutor, WorkflowQuery};
use crate::worker::registry::WorkflowRegistry;
use crate::workflow::failure::ErrorRegistry;
use crate::workflow::metadata::WorkflowMetadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info_span};
use weft_core::{CommandSerializer, History, SdkFlag};

/// A workflow task as handed out by the server
#[derive(Debug, Clone)]
pub struct WorkflowTask {
    pub workflow_type: String,
    pub workflow_id: String,
    pub run_id: String,
    /// Full history of the run, up to and including this task's start
    pub history: History,
    /// Queries to answer once the history is replayed, by query id
    pub queries: BTreeMap<String, WorkflowQuery>,
}

/// Response to a workflow task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowTaskResult {
    Completed {
        /// Commands in wire form
        commands: Vec<Value>,
        query_results: BTreeMap<String, QueryResult>,
        /// Codes of SDK flags to record with the task completion
        sdk_flags: Vec<u32>,
    },
    Failed {
        message: String,
        stack_trace: Option<String>,
    },
}

impl WorkflowTaskResult {
    fn failed(message: impl Into<String>, stack_trace: Option<String>) -> Self {
        Self::Failed {
            message: message.into(),
            stack_trace,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Processes workflow tasks against the registered workflows
pub struct WorkflowTaskProcessor {
    registry: Arc<WorkflowRegistry>,
    errors: Arc<ErrorRegistry>,
    config: WorkerConfig,
    serializer: CommandSerializer,
}

impl WorkflowTaskProcessor {
    pub fn new(registry: Arc<WorkflowRegistry>, config: WorkerConfig) -> Self {
        let serializer = CommandSerializer::new().with_namespace(config.namespace.clone());
        Self {
            registry,
            errors: Arc::new(ErrorRegistry::new()),
            config,
            serializer,
        }
    }

    /// Decode activity and child failures with these registered error types
    pub fn with_error_registry(mut self, errors: Arc<ErrorRegistry>) -> Self {
        self.errors = errors;
        self
    }

    pub fn process(&self, task: WorkflowTask) -> WorkflowTaskResult {
        let span = info_span!(
            "process_workflow_task",
            workflow_type = %task.workflow_type,
            workflow_id = %task.workflow_id,
            run_id = %task.run_id,
        );
        let _entered = span.enter();

        let workflow = match self.registry.resolve(&task.workflow_type) {
            Ok(workflow) => workflow,
            Err(e) => {
                error!(error = %e, "Workflow task for an unknown workflow type");
                return WorkflowTaskResult::failed(e.to_string(), None);
            }
        };

        let mut metadata = WorkflowMetadata::new(&task.workflow_type, &task.workflow_id, &task.run_id)
            .with_namespace(self.config.namespace.clone());
        metadata.task_queue = self.config.task_queue.clone();

        let mut executor = match WorkflowExecutor::new(
            workflow,
            task.history,
            metadata,
            self.config.executor.clone(),
            Arc::clone(&self.errors),
        ) {
            Ok(executor) => executor,
            Err(e) => return WorkflowTaskResult::failed(e.to_string(), None),
        };

        let run = match executor.run() {
            Ok(run) => run,
            Err(e) => {
                let stack_trace = if self.config.executor.capture_stack_trace {
                    executor.stack_trace()
                } else {
                    None
                };
                return WorkflowTaskResult::failed(e.to_string(), stack_trace);
            }
        };

        let commands = match self.serializer.serialize_all(&run.commands) {
            Ok(commands) => commands,
            Err(e) => {
                error!(error = %e, "Failed to serialize commands");
                return WorkflowTaskResult::failed(e.to_string(), None);
            }
        };

        debug!(commands = commands.len(), queries = task.queries.len(), "Workflow task processed");
        WorkflowTaskResult::Completed {
            commands,
            query_results: executor.process_queries(&task.queries),
            sdk_flags: run.new_sdk_flags_used.iter().map(SdkFlag::code).collect(),
        }
    }
}

impl std::fmt::Debug for WorkflowTaskProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowTaskProcessor")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
