//! History event types for replay

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Prefix carried by event type names on the wire
pub const EVENT_TYPE_PREFIX: &str = "EVENT_TYPE_";

/// Event types that can appear in a workflow run's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    // Workflow lifecycle events
    WorkflowExecutionStarted,
    WorkflowExecutionCompleted,
    WorkflowExecutionFailed,
    WorkflowExecutionTimedOut,
    WorkflowExecutionCancelRequested,
    WorkflowExecutionCanceled,
    WorkflowExecutionSignaled,
    WorkflowExecutionTerminated,
    WorkflowExecutionContinuedAsNew,

    // Workflow task (decision) events
    WorkflowTaskScheduled,
    WorkflowTaskStarted,
    WorkflowTaskCompleted,
    WorkflowTaskTimedOut,
    WorkflowTaskFailed,

    // Activity events
    ActivityTaskScheduled,
    ActivityTaskStarted,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    ActivityTaskTimedOut,
    ActivityTaskCancelRequested,
    ActivityTaskCanceled,

    // Timer events
    TimerStarted,
    TimerFired,
    TimerCanceled,

    // Marker events
    MarkerRecorded,

    // Child workflow events
    StartChildWorkflowExecutionInitiated,
    StartChildWorkflowExecutionFailed,
    ChildWorkflowExecutionStarted,
    ChildWorkflowExecutionCompleted,
    ChildWorkflowExecutionFailed,
    ChildWorkflowExecutionCanceled,
    ChildWorkflowExecutionTimedOut,
    ChildWorkflowExecutionTerminated,

    // External workflow events
    SignalExternalWorkflowExecutionInitiated,
    SignalExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionSignaled,
    RequestCancelExternalWorkflowExecutionInitiated,
    RequestCancelExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionCancelRequested,

    // Search attribute events
    UpsertWorkflowSearchAttributes,
}

impl EventType {
    /// Every event type, in wire enumeration order
    pub const ALL: [EventType; 40] = [
        Self::WorkflowExecutionStarted,
        Self::WorkflowExecutionCompleted,
        Self::WorkflowExecutionFailed,
        Self::WorkflowExecutionTimedOut,
        Self::WorkflowTaskScheduled,
        Self::WorkflowTaskStarted,
        Self::WorkflowTaskCompleted,
        Self::WorkflowTaskTimedOut,
        Self::WorkflowTaskFailed,
        Self::ActivityTaskScheduled,
        Self::ActivityTaskStarted,
        Self::ActivityTaskCompleted,
        Self::ActivityTaskFailed,
        Self::ActivityTaskTimedOut,
        Self::ActivityTaskCancelRequested,
        Self::ActivityTaskCanceled,
        Self::TimerStarted,
        Self::TimerFired,
        Self::TimerCanceled,
        Self::WorkflowExecutionCancelRequested,
        Self::WorkflowExecutionCanceled,
        Self::RequestCancelExternalWorkflowExecutionInitiated,
        Self::RequestCancelExternalWorkflowExecutionFailed,
        Self::ExternalWorkflowExecutionCancelRequested,
        Self::MarkerRecorded,
        Self::WorkflowExecutionSignaled,
        Self::WorkflowExecutionTerminated,
        Self::WorkflowExecutionContinuedAsNew,
        Self::StartChildWorkflowExecutionInitiated,
        Self::StartChildWorkflowExecutionFailed,
        Self::ChildWorkflowExecutionStarted,
        Self::ChildWorkflowExecutionCompleted,
        Self::ChildWorkflowExecutionFailed,
        Self::ChildWorkflowExecutionCanceled,
        Self::ChildWorkflowExecutionTimedOut,
        Self::ChildWorkflowExecutionTerminated,
        Self::SignalExternalWorkflowExecutionInitiated,
        Self::SignalExternalWorkflowExecutionFailed,
        Self::ExternalWorkflowExecutionSignaled,
        Self::UpsertWorkflowSearchAttributes,
    ];

    /// Get the canonical name, without the `EVENT_TYPE_` prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowExecutionStarted => "WORKFLOW_EXECUTION_STARTED",
            Self::WorkflowExecutionCompleted => "WORKFLOW_EXECUTION_COMPLETED",
            Self::WorkflowExecutionFailed => "WORKFLOW_EXECUTION_FAILED",
            Self::WorkflowExecutionTimedOut => "WORKFLOW_EXECUTION_TIMED_OUT",
            Self::WorkflowExecutionCancelRequested => "WORKFLOW_EXECUTION_CANCEL_REQUESTED",
            Self::WorkflowExecutionCanceled => "WORKFLOW_EXECUTION_CANCELED",
            Self::WorkflowExecutionSignaled => "WORKFLOW_EXECUTION_SIGNALED",
            Self::WorkflowExecutionTerminated => "WORKFLOW_EXECUTION_TERMINATED",
            Self::WorkflowExecutionContinuedAsNew => "WORKFLOW_EXECUTION_CONTINUED_AS_NEW",
            Self::WorkflowTaskScheduled => "WORKFLOW_TASK_SCHEDULED",
            Self::WorkflowTaskStarted => "WORKFLOW_TASK_STARTED",
            Self::WorkflowTaskCompleted => "WORKFLOW_TASK_COMPLETED",
            Self::WorkflowTaskTimedOut => "WORKFLOW_TASK_TIMED_OUT",
            Self::WorkflowTaskFailed => "WORKFLOW_TASK_FAILED",
            Self::ActivityTaskScheduled => "ACTIVITY_TASK_SCHEDULED",
            Self::ActivityTaskStarted => "ACTIVITY_TASK_STARTED",
            Self::ActivityTaskCompleted => "ACTIVITY_TASK_COMPLETED",
            Self::ActivityTaskFailed => "ACTIVITY_TASK_FAILED",
            Self::ActivityTaskTimedOut => "ACTIVITY_TASK_TIMED_OUT",
            Self::ActivityTaskCancelRequested => "ACTIVITY_TASK_CANCEL_REQUESTED",
            Self::ActivityTaskCanceled => "ACTIVITY_TASK_CANCELED",
            Self::TimerStarted => "TIMER_STARTED",
            Self::TimerFired => "TIMER_FIRED",
            Self::TimerCanceled => "TIMER_CANCELED",
            Self::MarkerRecorded => "MARKER_RECORDED",
            Self::StartChildWorkflowExecutionInitiated => {
                "START_CHILD_WORKFLOW_EXECUTION_INITIATED"
            }
            Self::StartChildWorkflowExecutionFailed => "START_CHILD_WORKFLOW_EXECUTION_FAILED",
            Self::ChildWorkflowExecutionStarted => "CHILD_WORKFLOW_EXECUTION_STARTED",
            Self::ChildWorkflowExecutionCompleted => "CHILD_WORKFLOW_EXECUTION_COMPLETED",
            Self::ChildWorkflowExecutionFailed => "CHILD_WORKFLOW_EXECUTION_FAILED",
            Self::ChildWorkflowExecutionCanceled => "CHILD_WORKFLOW_EXECUTION_CANCELED",
            Self::ChildWorkflowExecutionTimedOut => "CHILD_WORKFLOW_EXECUTION_TIMED_OUT",
            Self::ChildWorkflowExecutionTerminated => "CHILD_WORKFLOW_EXECUTION_TERMINATED",
            Self::SignalExternalWorkflowExecutionInitiated => {
                "SIGNAL_EXTERNAL_WORKFLOW_EXECUTION_INITIATED"
            }
            Self::SignalExternalWorkflowExecutionFailed => {
                "SIGNAL_EXTERNAL_WORKFLOW_EXECUTION_FAILED"
            }
            Self::ExternalWorkflowExecutionSignaled => "EXTERNAL_WORKFLOW_EXECUTION_SIGNALED",
            Self::RequestCancelExternalWorkflowExecutionInitiated => {
                "REQUEST_CANCEL_EXTERNAL_WORKFLOW_EXECUTION_INITIATED"
            }
            Self::RequestCancelExternalWorkflowExecutionFailed => {
                "REQUEST_CANCEL_EXTERNAL_WORKFLOW_EXECUTION_FAILED"
            }
            Self::ExternalWorkflowExecutionCancelRequested => {
                "EXTERNAL_WORKFLOW_EXECUTION_CANCEL_REQUESTED"
            }
            Self::UpsertWorkflowSearchAttributes => "UPSERT_WORKFLOW_SEARCH_ATTRIBUTES",
        }
    }

    /// Wire enumeration value of this event type
    pub fn code(&self) -> i32 {
        Self::ALL
            .iter()
            .position(|t| t == self)
            .map(|idx| idx as i32 + 1)
            .unwrap_or(0)
    }

    /// Look up an event type by its wire enumeration value
    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|c| c.checked_sub(1))
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Workflow task bookkeeping events, never replayed into workflow code
    pub fn is_workflow_task(&self) -> bool {
        matches!(
            self,
            Self::WorkflowTaskScheduled
                | Self::WorkflowTaskStarted
                | Self::WorkflowTaskCompleted
                | Self::WorkflowTaskTimedOut
                | Self::WorkflowTaskFailed
        )
    }

    /// Events recorded as the direct result of a command issued by workflow code
    pub fn is_command_event(&self) -> bool {
        matches!(
            self,
            Self::ActivityTaskScheduled
                | Self::ActivityTaskCancelRequested
                | Self::TimerStarted
                | Self::TimerCanceled
                | Self::StartChildWorkflowExecutionInitiated
                | Self::SignalExternalWorkflowExecutionInitiated
                | Self::RequestCancelExternalWorkflowExecutionInitiated
                | Self::MarkerRecorded
                | Self::UpsertWorkflowSearchAttributes
                | Self::WorkflowExecutionCompleted
                | Self::WorkflowExecutionFailed
                | Self::WorkflowExecutionContinuedAsNew
        )
    }

    /// Check if this event type closes the workflow run
    pub fn is_workflow_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowExecutionCompleted
                | Self::WorkflowExecutionFailed
                | Self::WorkflowExecutionTimedOut
                | Self::WorkflowExecutionCanceled
                | Self::WorkflowExecutionTerminated
                | Self::WorkflowExecutionContinuedAsNew
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    /// Accepts `EVENT_TYPE_TIMER_FIRED`, `TIMER_FIRED` and `TimerFired`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_event_type_name(name);
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| CoreError::InvalidHistory(format!("unknown event type '{}'", name)))
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}{}", EVENT_TYPE_PREFIX, self.as_str()))
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Convert any accepted spelling of an event type into its canonical form.
pub fn normalize_event_type_name(name: &str) -> String {
    let stripped = name.strip_prefix(EVENT_TYPE_PREFIX).unwrap_or(name);
    if stripped.chars().any(|c| c.is_ascii_lowercase()) {
        screaming_snake_case(stripped)
    } else {
        stripped.to_string()
    }
}

fn screaming_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    for (idx, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() && idx > 0 {
            out.push('_');
        }
        out.push(c.to_ascii_uppercase());
    }
    out
}

/// An immutable event from a workflow run's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Id of this event, unique and increasing within a run
    #[serde(rename = "eventId")]
    id: i64,

    /// Type of the event
    #[serde(rename = "eventType")]
    event_type: EventType,

    /// Server time at which the event was recorded
    #[serde(rename = "eventTime")]
    timestamp: DateTime<Utc>,

    /// Type-specific attributes (camelCase keys)
    attributes: Value,
}

impl HistoryEvent {
    /// Create a new history event
    pub fn new(id: i64, event_type: EventType, timestamp: DateTime<Utc>, attributes: Value) -> Self {
        Self {
            id,
            event_type,
            timestamp,
            attributes,
        }
    }

    /// Get the event id
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Get the event type
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Get the timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the attributes value
    pub fn attributes(&self) -> &Value {
        &self.attributes
    }

    /// Get an attribute
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Get an attribute as a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// Get an attribute as an i64. int64 fields arrive as JSON strings.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(value_as_i64)
    }

    /// Get an attribute as a bool, absent means false
    pub fn get_bool(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Id of the event that started the operation this event concerns.
    ///
    /// Completion events point back at the event their command produced, so
    /// that they land on the same [`EventTarget`](crate::workflow::EventTarget)
    /// as the command did.
    ///
    /// A completion event without its back-reference is malformed history.
    pub fn originating_event_id(&self) -> CoreResult<i64> {
        use EventType::*;

        let attribute = match self.event_type {
            TimerFired => "startedEventId",
            WorkflowExecutionSignaled | WorkflowExecutionTerminated => return Ok(1),
            ActivityTaskStarted | ActivityTaskCompleted | ActivityTaskFailed
            | ActivityTaskTimedOut | ActivityTaskCanceled => "scheduledEventId",
            StartChildWorkflowExecutionFailed
            | ChildWorkflowExecutionStarted
            | ChildWorkflowExecutionCompleted
            | ChildWorkflowExecutionFailed
            | ChildWorkflowExecutionCanceled
            | ChildWorkflowExecutionTimedOut
            | ChildWorkflowExecutionTerminated
            | SignalExternalWorkflowExecutionFailed
            | ExternalWorkflowExecutionSignaled
            | RequestCancelExternalWorkflowExecutionFailed
            | ExternalWorkflowExecutionCancelRequested => "initiatedEventId",
            _ => return Ok(self.id),
        };

        require_i64(self, attribute)
    }
}

/// Read an int64 that may be encoded as a JSON number or string.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Reject a missing or malformed required attribute.
fn require_i64(event: &HistoryEvent, key: &str) -> CoreResult<i64> {
    event.get_i64(key).ok_or_else(|| {
        CoreError::InvalidHistory(format!(
            "event {} ({}) is missing attribute '{}'",
            event.id(),
            event.event_type(),
            key
        ))
    })
}
