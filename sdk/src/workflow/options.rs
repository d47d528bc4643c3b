//! Per-call options for operations issued from workflow code.

use serde_json::{Map, Value};
use std::time::Duration;
use weft_core::workflow::{ActivityTimeouts, ParentClosePolicy, WorkflowIdReusePolicy, WorkflowTimeouts};
use weft_core::{ClientError, RetryPolicy};

/// Options for scheduling an activity
#[derive(Debug, Clone, Default)]
pub struct ActivityOptions {
    /// Defaults to the id of the scheduling command
    pub activity_id: Option<String>,
    pub namespace: Option<String>,
    /// Defaults to the workflow's task queue
    pub task_queue: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub timeouts: ActivityTimeouts,
    pub headers: Map<String, Value>,
}

impl ActivityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }

    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set a retry policy, rejecting invalid ones up front
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Result<Self, ClientError> {
        retry_policy.validate()?;
        self.retry_policy = Some(retry_policy);
        Ok(self)
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.start_to_close = Some(timeout);
        self
    }

    pub fn with_schedule_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.schedule_to_close = Some(timeout);
        self
    }

    pub fn with_schedule_to_start_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.schedule_to_start = Some(timeout);
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.heartbeat = Some(timeout);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: Value) -> Self {
        self.headers.insert(key.into(), value);
        self
    }
}

/// Options for starting a child workflow
#[derive(Debug, Clone, Default)]
pub struct ChildWorkflowOptions {
    /// Defaults to an id derived from the run id and the command id
    pub workflow_id: Option<String>,
    pub namespace: Option<String>,
    pub task_queue: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub parent_close_policy: ParentClosePolicy,
    pub workflow_id_reuse_policy: WorkflowIdReusePolicy,
    pub timeouts: WorkflowTimeouts,
    pub cron_schedule: Option<String>,
    pub headers: Map<String, Value>,
    pub memo: Map<String, Value>,
    pub search_attributes: Map<String, Value>,
}

impl ChildWorkflowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Result<Self, ClientError> {
        retry_policy.validate()?;
        self.retry_policy = Some(retry_policy);
        Ok(self)
    }

    pub fn with_parent_close_policy(mut self, policy: ParentClosePolicy) -> Self {
        self.parent_close_policy = policy;
        self
    }

    pub fn with_workflow_id_reuse_policy(mut self, policy: WorkflowIdReusePolicy) -> Self {
        self.workflow_id_reuse_policy = policy;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.execution = Some(timeout);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.run = Some(timeout);
        self
    }

    pub fn with_cron_schedule(mut self, cron_schedule: impl Into<String>) -> Self {
        self.cron_schedule = Some(cron_schedule.into());
        self
    }

    pub fn with_memo(mut self, key: impl Into<String>, value: Value) -> Self {
        self.memo.insert(key.into(), value);
        self
    }

    pub fn with_search_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.search_attributes.insert(key.into(), value);
        self
    }
}

/// Options for continuing a workflow as new.
///
/// Unset fields carry over from the current run where the server allows it.
#[derive(Debug, Clone, Default)]
pub struct ContinueAsNewOptions {
    /// Defaults to the current workflow type
    pub workflow_type: Option<String>,
    pub task_queue: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub timeouts: WorkflowTimeouts,
    pub headers: Map<String, Value>,
    pub memo: Map<String, Value>,
    pub search_attributes: Map<String, Value>,
}

impl ContinueAsNewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    pub fn with_memo(mut self, key: impl Into<String>, value: Value) -> Self {
        self.memo.insert(key.into(), value);
        self
    }
}
