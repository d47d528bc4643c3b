//! Correlation of history events with the operations they concern.

use crate::error::{CoreResult, InternalError};
use crate::workflow::event::HistoryEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of operation an event or command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Activity,
    CancelActivityRequest,
    Timer,
    CancelTimerRequest,
    ChildWorkflow,
    Marker,
    ExternalWorkflow,
    CancelExternalWorkflowRequest,
    Workflow,
    CancelWorkflowRequest,
    UpsertSearchAttributesRequest,
    CompleteWorkflow,
    FailWorkflow,
    ContinueAsNewWorkflow,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::CancelActivityRequest => "cancel_activity_request",
            Self::Timer => "timer",
            Self::CancelTimerRequest => "cancel_timer_request",
            Self::ChildWorkflow => "child_workflow",
            Self::Marker => "marker",
            Self::ExternalWorkflow => "external_workflow",
            Self::CancelExternalWorkflowRequest => "cancel_external_workflow_request",
            Self::Workflow => "workflow",
            Self::CancelWorkflowRequest => "cancel_workflow_request",
            Self::UpsertSearchAttributesRequest => "upsert_search_attributes_request",
            Self::CompleteWorkflow => "complete_workflow",
            Self::FailWorkflow => "fail_workflow",
            Self::ContinueAsNewWorkflow => "continue_as_new_workflow",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event type name prefixes and the target type they map to.
/// Lookup picks the longest matching prefix.
const TARGET_TYPES: &[(&str, TargetType)] = &[
    ("ACTIVITY_TASK_CANCEL_REQUESTED", TargetType::CancelActivityRequest),
    ("ACTIVITY_TASK", TargetType::Activity),
    ("REQUEST_CANCEL_ACTIVITY_TASK", TargetType::CancelActivityRequest),
    ("TIMER_CANCELED", TargetType::CancelTimerRequest),
    ("TIMER", TargetType::Timer),
    ("CANCEL_TIMER", TargetType::CancelTimerRequest),
    ("CHILD_WORKFLOW_EXECUTION", TargetType::ChildWorkflow),
    ("START_CHILD_WORKFLOW_EXECUTION", TargetType::ChildWorkflow),
    ("MARKER", TargetType::Marker),
    ("EXTERNAL_WORKFLOW_EXECUTION", TargetType::ExternalWorkflow),
    ("SIGNAL_EXTERNAL_WORKFLOW_EXECUTION", TargetType::ExternalWorkflow),
    (
        "EXTERNAL_WORKFLOW_EXECUTION_CANCEL",
        TargetType::CancelExternalWorkflowRequest,
    ),
    (
        "REQUEST_CANCEL_EXTERNAL_WORKFLOW_EXECUTION",
        TargetType::CancelExternalWorkflowRequest,
    ),
    (
        "UPSERT_WORKFLOW_SEARCH_ATTRIBUTES",
        TargetType::UpsertSearchAttributesRequest,
    ),
    ("WORKFLOW_EXECUTION_CANCEL", TargetType::CancelWorkflowRequest),
    ("WORKFLOW_EXECUTION_COMPLETED", TargetType::CompleteWorkflow),
    ("WORKFLOW_EXECUTION_FAILED", TargetType::FailWorkflow),
    (
        "WORKFLOW_EXECUTION_CONTINUED_AS_NEW",
        TargetType::ContinueAsNewWorkflow,
    ),
    ("WORKFLOW_EXECUTION", TargetType::Workflow),
];

/// Identifies the in-flight operation an event or command concerns.
///
/// Commands get their target when they are scheduled (the id is the event id
/// the command is expected to produce). Events get theirs through
/// [`EventTarget::from_event`]. Equal targets mean the event answers the
/// command, which is how results find their way back to waiting futures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventTarget {
    id: i64,
    target_type: TargetType,
}

impl EventTarget {
    pub fn new(id: i64, target_type: TargetType) -> Self {
        Self { id, target_type }
    }

    /// The workflow-level target; signals and workflow start land here
    pub fn workflow() -> Self {
        Self::new(1, TargetType::Workflow)
    }

    /// Map an event to the operation it concerns
    pub fn from_event(event: &HistoryEvent) -> CoreResult<Self> {
        let name = event.event_type().as_str();
        let target_type = target_type_for(name)
            .ok_or_else(|| InternalError::UnexpectedEventType(name.to_string()))?;

        Ok(Self::new(event.originating_event_id()?, target_type))
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn target_type(&self) -> TargetType {
        self.target_type
    }
}

impl fmt::Display for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.target_type, self.id)
    }
}

/// Longest-prefix lookup of an event type name in the target table.
pub fn target_type_for(event_type_name: &str) -> Option<TargetType> {
    TARGET_TYPES
        .iter()
        .filter(|(prefix, _)| event_type_name.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, target_type)| *target_type)
}
