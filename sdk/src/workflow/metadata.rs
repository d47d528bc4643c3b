//! Identity and start parameters of the running workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use weft_core::workflow::payload::decode_payload_map;
use weft_core::{CoreResult, EventType, HistoryEvent};

pub const DEFAULT_NAMESPACE: &str = "default";

/// What workflow code knows about its own run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub namespace: String,
    pub workflow_type: String,
    pub workflow_id: String,
    pub run_id: String,
    pub task_queue: Option<String>,
    pub attempt: u32,
    pub headers: Map<String, Value>,
    pub memo: Map<String, Value>,
    pub parent_workflow_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl WorkflowMetadata {
    pub fn new(
        workflow_type: impl Into<String>,
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            workflow_type: workflow_type.into(),
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            task_queue: None,
            attempt: 1,
            headers: Map::new(),
            memo: Map::new(),
            parent_workflow_id: None,
            started_at: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    /// Fill in start parameters from a `WorkflowExecutionStarted` event.
    ///
    /// A task queue already set by the worker is kept. Events of any other
    /// type leave the metadata untouched.
    pub fn with_start_event(mut self, event: &HistoryEvent) -> CoreResult<Self> {
        if event.event_type() != EventType::WorkflowExecutionStarted {
            return Ok(self);
        }

        if let Some(name) = nested_str(event.get("workflowType"), "name") {
            self.workflow_type = name.to_string();
        }
        if self.task_queue.is_none() {
            self.task_queue = nested_str(event.get("taskQueue"), "name").map(str::to_string);
        }
        if let Some(attempt) = event.get_i64("attempt").and_then(|a| u32::try_from(a).ok()) {
            self.attempt = attempt.max(1);
        }
        self.headers = decode_payload_map(event.get("header").and_then(|h| h.get("fields")))?;
        self.memo = decode_payload_map(event.get("memo").and_then(|m| m.get("fields")))?;
        self.parent_workflow_id =
            nested_str(event.get("parentWorkflowExecution"), "workflowId").map(str::to_string);
        self.started_at = Some(event.timestamp());
        Ok(self)
    }
}

fn nested_str<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a str> {
    value.and_then(|v| v.get(key)).and_then(Value::as_str)
}
