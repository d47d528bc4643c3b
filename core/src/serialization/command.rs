//! Command encoding for the workflow task completion response.
//!
//! Commands are written in the JSON mapping of the server's API: a
//! `commandType` tag plus an attributes object named after the command.
//! Inputs, results and details are wrapped into payloads.

use crate::error::{CoreError, CoreResult};
use crate::workflow::command::{ActivityTimeouts, WorkflowTimeouts};
use crate::workflow::payload::{encode_payload, encode_payloads};
use crate::workflow::{Command, RetryPolicy};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Converts commands into their wire representation
#[derive(Debug, Clone, Default)]
pub struct CommandSerializer {
    namespace: Option<String>,
}

impl CommandSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace used when a command doesn't name one
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Serialize a batch of commands, preserving order
    pub fn serialize_all<'a, I>(&self, commands: I) -> CoreResult<Vec<Value>>
    where
        I: IntoIterator<Item = &'a Command>,
    {
        commands.into_iter().map(|c| self.serialize(c)).collect()
    }

    /// Serialize a batch of commands to a JSON string
    pub fn to_json<'a, I>(&self, commands: I) -> CoreResult<String>
    where
        I: IntoIterator<Item = &'a Command>,
    {
        Ok(serde_json::to_string(&self.serialize_all(commands)?)?)
    }

    /// Serialize a single command
    pub fn serialize(&self, command: &Command) -> CoreResult<Value> {
        let (command_type, attributes_key, attributes) = match command {
            Command::ScheduleActivity(cmd) => (
                "COMMAND_TYPE_SCHEDULE_ACTIVITY_TASK",
                "scheduleActivityTaskCommandAttributes",
                compact(json!({
                    "activityId": cmd.activity_id,
                    "activityType": { "name": cmd.activity_type },
                    "namespace": self.namespace_for(cmd.namespace.as_deref()),
                    "taskQueue": task_queue(cmd.task_queue.as_deref()),
                    "input": input(&cmd.input),
                    "header": header(&cmd.headers),
                    "retryPolicy": cmd.retry_policy.as_ref().map(retry_policy),
                    "scheduleToCloseTimeout": activity_timeout(&cmd.timeouts, |t| t.schedule_to_close),
                    "scheduleToStartTimeout": activity_timeout(&cmd.timeouts, |t| t.schedule_to_start),
                    "startToCloseTimeout": activity_timeout(&cmd.timeouts, |t| t.start_to_close),
                    "heartbeatTimeout": activity_timeout(&cmd.timeouts, |t| t.heartbeat),
                })),
            ),
            Command::RequestActivityCancellation { activity_id } => (
                "COMMAND_TYPE_REQUEST_CANCEL_ACTIVITY_TASK",
                "requestCancelActivityTaskCommandAttributes",
                json!({ "scheduledEventId": scheduled_event_id(activity_id)? }),
            ),
            Command::StartTimer { timer_id, timeout } => (
                "COMMAND_TYPE_START_TIMER",
                "startTimerCommandAttributes",
                json!({
                    "timerId": timer_id,
                    "startToFireTimeout": duration(*timeout),
                }),
            ),
            Command::CancelTimer { timer_id } => (
                "COMMAND_TYPE_CANCEL_TIMER",
                "cancelTimerCommandAttributes",
                json!({ "timerId": timer_id }),
            ),
            Command::StartChildWorkflow(cmd) => (
                "COMMAND_TYPE_START_CHILD_WORKFLOW_EXECUTION",
                "startChildWorkflowExecutionCommandAttributes",
                compact(json!({
                    "namespace": self.namespace_for(cmd.namespace.as_deref()),
                    "workflowId": cmd.workflow_id,
                    "workflowType": { "name": cmd.workflow_type },
                    "taskQueue": task_queue(cmd.task_queue.as_deref()),
                    "input": input(&cmd.input),
                    "workflowExecutionTimeout": workflow_timeout(&cmd.timeouts, |t| t.execution),
                    "workflowRunTimeout": workflow_timeout(&cmd.timeouts, |t| t.run),
                    "workflowTaskTimeout": workflow_timeout(&cmd.timeouts, |t| t.task),
                    "parentClosePolicy": format!("PARENT_CLOSE_POLICY_{}", enum_name(&cmd.parent_close_policy)?),
                    "workflowIdReusePolicy": format!("WORKFLOW_ID_REUSE_POLICY_{}", enum_name(&cmd.workflow_id_reuse_policy)?),
                    "retryPolicy": cmd.retry_policy.as_ref().map(retry_policy),
                    "cronSchedule": cmd.cron_schedule,
                    "header": header(&cmd.headers),
                    "memo": memo(&cmd.memo),
                    "searchAttributes": search_attributes(&cmd.search_attributes),
                })),
            ),
            Command::RecordMarker { name, details } => (
                "COMMAND_TYPE_RECORD_MARKER",
                "recordMarkerCommandAttributes",
                json!({
                    "markerName": name,
                    "details": marker_details(details),
                }),
            ),
            Command::CompleteWorkflow { result } => (
                "COMMAND_TYPE_COMPLETE_WORKFLOW_EXECUTION",
                "completeWorkflowExecutionCommandAttributes",
                compact(json!({ "result": input(result) })),
            ),
            Command::FailWorkflow { failure } => (
                "COMMAND_TYPE_FAIL_WORKFLOW_EXECUTION",
                "failWorkflowExecutionCommandAttributes",
                json!({ "failure": serde_json::to_value(failure)? }),
            ),
            Command::ContinueAsNew(cmd) => (
                "COMMAND_TYPE_CONTINUE_AS_NEW_WORKFLOW_EXECUTION",
                "continueAsNewWorkflowExecutionCommandAttributes",
                compact(json!({
                    "workflowType": { "name": cmd.workflow_type },
                    "taskQueue": task_queue(cmd.task_queue.as_deref()),
                    "input": input(&cmd.input),
                    "workflowRunTimeout": workflow_timeout(&cmd.timeouts, |t| t.run),
                    "workflowTaskTimeout": workflow_timeout(&cmd.timeouts, |t| t.task),
                    "retryPolicy": cmd.retry_policy.as_ref().map(retry_policy),
                    "header": header(&cmd.headers),
                    "memo": memo(&cmd.memo),
                    "searchAttributes": search_attributes(&cmd.search_attributes),
                })),
            ),
            Command::UpsertSearchAttributes { search_attributes: attributes } => (
                "COMMAND_TYPE_UPSERT_WORKFLOW_SEARCH_ATTRIBUTES",
                "upsertWorkflowSearchAttributesCommandAttributes",
                json!({ "searchAttributes": search_attributes(attributes) }),
            ),
            Command::SignalExternalWorkflow(cmd) => (
                "COMMAND_TYPE_SIGNAL_EXTERNAL_WORKFLOW_EXECUTION",
                "signalExternalWorkflowExecutionCommandAttributes",
                compact(json!({
                    "namespace": self.namespace_for(cmd.namespace.as_deref()),
                    "execution": compact(json!({
                        "workflowId": cmd.workflow_id,
                        "runId": cmd.run_id,
                    })),
                    "signalName": cmd.signal_name,
                    "input": input(&cmd.input),
                    "childWorkflowOnly": cmd.child_workflow_only,
                })),
            ),
        };

        Ok(json!({
            "commandType": command_type,
            attributes_key: attributes,
        }))
    }

    fn namespace_for(&self, namespace: Option<&str>) -> Option<String> {
        namespace
            .map(str::to_string)
            .or_else(|| self.namespace.clone())
    }
}

/// Format a duration the way the JSON protobuf mapping expects
pub fn duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}.{:09}s", d.as_secs(), d.subsec_nanos())
    }
}

/// Activity ids are the id of the event that scheduled the activity
fn scheduled_event_id(activity_id: &str) -> CoreResult<i64> {
    activity_id.parse().map_err(|_| {
        CoreError::InvalidCommand(format!(
            "activity id '{}' does not name a scheduled event",
            activity_id
        ))
    })
}

fn retry_policy(policy: &RetryPolicy) -> Value {
    compact(json!({
        "initialInterval": policy.interval.map(duration),
        "backoffCoefficient": policy.backoff,
        "maximumInterval": policy.max_interval.map(duration),
        "maximumAttempts": policy.max_attempts,
        "nonRetryableErrorTypes": policy.non_retriable_errors,
    }))
}

fn input(value: &Value) -> Value {
    if value.is_null() {
        Value::Null
    } else {
        encode_payloads(std::slice::from_ref(value))
    }
}

fn task_queue(name: Option<&str>) -> Value {
    name.map_or(Value::Null, |name| json!({ "name": name }))
}

fn activity_timeout(timeouts: &ActivityTimeouts, pick: fn(&ActivityTimeouts) -> Option<Duration>) -> Option<String> {
    pick(timeouts).map(duration)
}

fn workflow_timeout(timeouts: &WorkflowTimeouts, pick: fn(&WorkflowTimeouts) -> Option<Duration>) -> Option<String> {
    pick(timeouts).map(duration)
}

fn payload_map(entries: &Map<String, Value>) -> Map<String, Value> {
    entries
        .iter()
        .map(|(key, value)| (key.clone(), encode_payload(value)))
        .collect()
}

fn header(headers: &Map<String, Value>) -> Value {
    if headers.is_empty() {
        return Value::Null;
    }
    json!({ "fields": payload_map(headers) })
}

fn memo(memo: &Map<String, Value>) -> Value {
    if memo.is_empty() {
        return Value::Null;
    }
    json!({ "fields": payload_map(memo) })
}

fn search_attributes(attributes: &Map<String, Value>) -> Value {
    if attributes.is_empty() {
        return Value::Null;
    }
    json!({ "indexedFields": payload_map(attributes) })
}

fn marker_details(details: &Value) -> Value {
    match details {
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), encode_payloads(std::slice::from_ref(value))))
                .collect(),
        ),
        Value::Null => json!({}),
        other => json!({ "data": encode_payloads(std::slice::from_ref(other)) }),
    }
}

fn enum_name<T: serde::Serialize>(value: &T) -> CoreResult<String> {
    Ok(serde_json::to_value(value)?
        .as_str()
        .unwrap_or_default()
        .to_string())
}

/// Drop null members so that unset options are omitted rather than sent
fn compact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    }
}
