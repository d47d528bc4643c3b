//! Commands (decisions) issued by workflow code.

use crate::workflow::event_target::TargetType;
use crate::workflow::failure::FailureInfo;
use crate::workflow::retry_policy::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Timeouts applicable to an activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTimeouts {
    pub schedule_to_close: Option<Duration>,
    pub schedule_to_start: Option<Duration>,
    pub start_to_close: Option<Duration>,
    pub heartbeat: Option<Duration>,
}

/// Timeouts applicable to a workflow run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTimeouts {
    pub execution: Option<Duration>,
    pub run: Option<Duration>,
    pub task: Option<Duration>,
}

/// What the server does with a child when its parent closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParentClosePolicy {
    #[default]
    Terminate,
    Abandon,
    RequestCancel,
}

/// Whether a workflow id can be reused by a new run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowIdReusePolicy {
    #[default]
    AllowDuplicate,
    AllowDuplicateFailedOnly,
    RejectDuplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleActivity {
    pub activity_id: String,
    pub activity_type: String,
    pub input: Value,
    pub namespace: Option<String>,
    pub task_queue: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub timeouts: ActivityTimeouts,
    pub headers: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartChildWorkflow {
    pub workflow_id: String,
    pub workflow_type: String,
    pub input: Value,
    pub namespace: Option<String>,
    pub task_queue: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub parent_close_policy: ParentClosePolicy,
    pub timeouts: WorkflowTimeouts,
    pub headers: Map<String, Value>,
    pub cron_schedule: Option<String>,
    pub memo: Map<String, Value>,
    pub workflow_id_reuse_policy: WorkflowIdReusePolicy,
    pub search_attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinueAsNew {
    pub workflow_type: String,
    pub task_queue: Option<String>,
    pub input: Value,
    pub timeouts: WorkflowTimeouts,
    pub retry_policy: Option<RetryPolicy>,
    pub headers: Map<String, Value>,
    pub memo: Map<String, Value>,
    pub search_attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalExternalWorkflow {
    pub namespace: Option<String>,
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub signal_name: String,
    pub input: Value,
    pub child_workflow_only: bool,
}

/// A decision for the server to act on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    ScheduleActivity(ScheduleActivity),
    RequestActivityCancellation { activity_id: String },
    StartTimer { timer_id: String, timeout: Duration },
    CancelTimer { timer_id: String },
    StartChildWorkflow(StartChildWorkflow),
    RecordMarker { name: String, details: Value },
    CompleteWorkflow { result: Value },
    FailWorkflow { failure: FailureInfo },
    ContinueAsNew(ContinueAsNew),
    UpsertSearchAttributes { search_attributes: Map<String, Value> },
    SignalExternalWorkflow(SignalExternalWorkflow),
}

impl Command {
    /// Target type of the event this command produces in history
    pub fn target_type(&self) -> TargetType {
        match self {
            Self::ScheduleActivity(_) => TargetType::Activity,
            Self::RequestActivityCancellation { .. } => TargetType::CancelActivityRequest,
            Self::StartTimer { .. } => TargetType::Timer,
            Self::CancelTimer { .. } => TargetType::CancelTimerRequest,
            Self::StartChildWorkflow(_) => TargetType::ChildWorkflow,
            Self::RecordMarker { .. } => TargetType::Marker,
            Self::CompleteWorkflow { .. } => TargetType::CompleteWorkflow,
            Self::FailWorkflow { .. } => TargetType::FailWorkflow,
            Self::ContinueAsNew(_) => TargetType::ContinueAsNewWorkflow,
            Self::UpsertSearchAttributes { .. } => TargetType::UpsertSearchAttributesRequest,
            Self::SignalExternalWorkflow(_) => TargetType::ExternalWorkflow,
        }
    }

    /// Name of the command kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScheduleActivity(_) => "ScheduleActivity",
            Self::RequestActivityCancellation { .. } => "RequestActivityCancellation",
            Self::StartTimer { .. } => "StartTimer",
            Self::CancelTimer { .. } => "CancelTimer",
            Self::StartChildWorkflow(_) => "StartChildWorkflow",
            Self::RecordMarker { .. } => "RecordMarker",
            Self::CompleteWorkflow { .. } => "CompleteWorkflow",
            Self::FailWorkflow { .. } => "FailWorkflow",
            Self::ContinueAsNew(_) => "ContinueAsNew",
            Self::UpsertSearchAttributes { .. } => "UpsertSearchAttributes",
            Self::SignalExternalWorkflow(_) => "SignalExternalWorkflow",
        }
    }

    /// Commands that close the workflow run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CompleteWorkflow { .. } | Self::FailWorkflow { .. } | Self::ContinueAsNew(_)
        )
    }

    /// Id used to cancel the operation this command started, if it has one
    pub fn cancelation_id(&self) -> Option<&str> {
        match self {
            Self::ScheduleActivity(cmd) => Some(&cmd.activity_id),
            Self::StartChildWorkflow(cmd) => Some(&cmd.workflow_id),
            Self::StartTimer { timer_id, .. } => Some(timer_id),
            _ => None,
        }
    }
}
