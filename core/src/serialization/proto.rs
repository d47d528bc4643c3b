//! Binary (protobuf) history messages.
//!
//! Only the fields the engine reads are declared; anything else on the wire
//! is skipped by the decoder. Decoded events carry the same camelCase
//! attribute layout as JSON histories, so the rest of the engine never needs
//! to know which encoding a history arrived in.

use crate::error::{CoreError, CoreResult};
use crate::workflow::{EventType, History, HistoryEvent};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use prost::Message;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

#[derive(Clone, PartialEq, Message)]
pub struct HistoryProto {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<HistoryEventProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct HistoryEventProto {
    #[prost(int64, tag = "1")]
    pub event_id: i64,
    #[prost(message, optional, tag = "2")]
    pub event_time: Option<prost_types::Timestamp>,
    #[prost(int32, tag = "3")]
    pub event_type: i32,
    #[prost(
        oneof = "history_event::Attributes",
        tags = "6, 7, 8, 11, 12, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45"
    )]
    pub attributes: Option<history_event::Attributes>,
}

pub mod history_event {
    use super::*;

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Attributes {
        #[prost(message, tag = "6")]
        WorkflowExecutionStarted(WorkflowExecutionStartedAttributes),
        #[prost(message, tag = "7")]
        WorkflowExecutionCompleted(ResultAttributes),
        #[prost(message, tag = "8")]
        WorkflowExecutionFailed(FailureAttributes),
        #[prost(message, tag = "11")]
        WorkflowTaskStarted(WorkflowTaskStartedAttributes),
        #[prost(message, tag = "12")]
        WorkflowTaskCompleted(WorkflowTaskCompletedAttributes),
        #[prost(message, tag = "15")]
        ActivityTaskScheduled(ActivityTaskScheduledAttributes),
        #[prost(message, tag = "16")]
        ActivityTaskStarted(ActivityTaskStartedAttributes),
        #[prost(message, tag = "17")]
        ActivityTaskCompleted(ActivityResultAttributes),
        #[prost(message, tag = "18")]
        ActivityTaskFailed(ActivityFailureAttributes),
        #[prost(message, tag = "19")]
        ActivityTaskTimedOut(ActivityFailureAttributes),
        #[prost(message, tag = "20")]
        TimerStarted(TimerStartedAttributes),
        #[prost(message, tag = "21")]
        TimerFired(TimerAttributes),
        #[prost(message, tag = "22")]
        ActivityTaskCancelRequested(ActivityTaskCancelRequestedAttributes),
        #[prost(message, tag = "23")]
        ActivityTaskCanceled(ActivityTaskCanceledAttributes),
        #[prost(message, tag = "24")]
        TimerCanceled(TimerAttributes),
        #[prost(message, tag = "25")]
        MarkerRecorded(MarkerRecordedAttributes),
        #[prost(message, tag = "26")]
        WorkflowExecutionSignaled(SignaledAttributes),
        #[prost(message, tag = "27")]
        WorkflowExecutionTerminated(TerminatedAttributes),
        #[prost(message, tag = "28")]
        WorkflowExecutionCancelRequested(CancelRequestedAttributes),
        #[prost(message, tag = "33")]
        WorkflowExecutionContinuedAsNew(ContinuedAsNewAttributes),
        #[prost(message, tag = "34")]
        StartChildWorkflowExecutionInitiated(StartChildInitiatedAttributes),
        #[prost(message, tag = "35")]
        StartChildWorkflowExecutionFailed(StartChildFailedAttributes),
        #[prost(message, tag = "36")]
        ChildWorkflowExecutionStarted(ChildStartedAttributes),
        #[prost(message, tag = "37")]
        ChildWorkflowExecutionCompleted(ChildResultAttributes),
        #[prost(message, tag = "38")]
        ChildWorkflowExecutionFailed(ChildFailureAttributes),
        #[prost(message, tag = "39")]
        ChildWorkflowExecutionCanceled(ChildResultAttributes),
        #[prost(message, tag = "40")]
        ChildWorkflowExecutionTimedOut(ChildClosedAttributes),
        #[prost(message, tag = "41")]
        ChildWorkflowExecutionTerminated(ChildClosedAttributes),
        #[prost(message, tag = "42")]
        SignalExternalWorkflowExecutionInitiated(SignalExternalInitiatedAttributes),
        #[prost(message, tag = "43")]
        SignalExternalWorkflowExecutionFailed(SignalExternalFailedAttributes),
        #[prost(message, tag = "44")]
        ExternalWorkflowExecutionSignaled(ExternalSignaledAttributes),
        #[prost(message, tag = "45")]
        UpsertWorkflowSearchAttributes(UpsertSearchAttributesAttributes),
    }
}

// ============================================================================
// Common messages
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct Payload {
    #[prost(map = "string, bytes", tag = "1")]
    pub metadata: HashMap<String, Vec<u8>>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Payloads {
    #[prost(message, repeated, tag = "1")]
    pub payloads: Vec<Payload>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NamedType {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct WorkflowExecution {
    #[prost(string, tag = "1")]
    pub workflow_id: String,
    #[prost(string, tag = "2")]
    pub run_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Failure {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(string, tag = "2")]
    pub source: String,
    #[prost(string, tag = "3")]
    pub stack_trace: String,
    #[prost(message, optional, boxed, tag = "4")]
    pub cause: Option<Box<Failure>>,
    #[prost(oneof = "failure::Info", tags = "5, 6, 7, 8")]
    pub info: Option<failure::Info>,
}

pub mod failure {
    use super::*;

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Info {
        #[prost(message, tag = "5")]
        Application(ApplicationFailureInfo),
        #[prost(message, tag = "6")]
        Timeout(TimeoutFailureInfo),
        #[prost(message, tag = "7")]
        Canceled(CanceledFailureInfo),
        #[prost(message, tag = "8")]
        Terminated(TerminatedFailureInfo),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ApplicationFailureInfo {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(bool, tag = "2")]
    pub non_retryable: bool,
    #[prost(message, optional, tag = "3")]
    pub details: Option<Payloads>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TimeoutFailureInfo {
    #[prost(int32, tag = "1")]
    pub timeout_type: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CanceledFailureInfo {
    #[prost(message, optional, tag = "1")]
    pub details: Option<Payloads>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TerminatedFailureInfo {}

// ============================================================================
// Event attributes
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct WorkflowExecutionStartedAttributes {
    #[prost(message, optional, tag = "1")]
    pub workflow_type: Option<NamedType>,
    #[prost(message, optional, tag = "5")]
    pub task_queue: Option<NamedType>,
    #[prost(message, optional, tag = "6")]
    pub input: Option<Payloads>,
    #[prost(string, tag = "14")]
    pub original_execution_run_id: String,
    #[prost(string, tag = "16")]
    pub first_execution_run_id: String,
    #[prost(int32, tag = "18")]
    pub attempt: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ResultAttributes {
    #[prost(message, optional, tag = "1")]
    pub result: Option<Payloads>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FailureAttributes {
    #[prost(message, optional, tag = "1")]
    pub failure: Option<Failure>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WorkflowTaskStartedAttributes {
    #[prost(int64, tag = "1")]
    pub scheduled_event_id: i64,
    #[prost(bool, tag = "4")]
    pub suggest_continue_as_new: bool,
    #[prost(int64, tag = "5")]
    pub history_size_bytes: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct WorkflowTaskCompletedMetadata {
    #[prost(uint32, repeated, tag = "1")]
    pub core_used_flags: Vec<u32>,
    #[prost(uint32, repeated, tag = "2")]
    pub lang_used_flags: Vec<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WorkflowTaskCompletedAttributes {
    #[prost(int64, tag = "1")]
    pub scheduled_event_id: i64,
    #[prost(int64, tag = "2")]
    pub started_event_id: i64,
    #[prost(message, optional, tag = "6")]
    pub sdk_metadata: Option<WorkflowTaskCompletedMetadata>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ActivityTaskScheduledAttributes {
    #[prost(string, tag = "1")]
    pub activity_id: String,
    #[prost(message, optional, tag = "2")]
    pub activity_type: Option<NamedType>,
    #[prost(message, optional, tag = "6")]
    pub input: Option<Payloads>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ActivityTaskStartedAttributes {
    #[prost(int64, tag = "1")]
    pub scheduled_event_id: i64,
    #[prost(int32, tag = "4")]
    pub attempt: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ActivityResultAttributes {
    #[prost(message, optional, tag = "1")]
    pub result: Option<Payloads>,
    #[prost(int64, tag = "2")]
    pub scheduled_event_id: i64,
    #[prost(int64, tag = "3")]
    pub started_event_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ActivityFailureAttributes {
    #[prost(message, optional, tag = "1")]
    pub failure: Option<Failure>,
    #[prost(int64, tag = "2")]
    pub scheduled_event_id: i64,
    #[prost(int64, tag = "3")]
    pub started_event_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ActivityTaskCancelRequestedAttributes {
    #[prost(int64, tag = "1")]
    pub scheduled_event_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ActivityTaskCanceledAttributes {
    #[prost(message, optional, tag = "1")]
    pub details: Option<Payloads>,
    #[prost(int64, tag = "2")]
    pub latest_cancel_requested_event_id: i64,
    #[prost(int64, tag = "3")]
    pub scheduled_event_id: i64,
    #[prost(int64, tag = "4")]
    pub started_event_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TimerStartedAttributes {
    #[prost(string, tag = "1")]
    pub timer_id: String,
    #[prost(message, optional, tag = "2")]
    pub start_to_fire_timeout: Option<prost_types::Duration>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TimerAttributes {
    #[prost(string, tag = "1")]
    pub timer_id: String,
    #[prost(int64, tag = "2")]
    pub started_event_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MarkerRecordedAttributes {
    #[prost(string, tag = "1")]
    pub marker_name: String,
    #[prost(map = "string, message", tag = "2")]
    pub details: HashMap<String, Payloads>,
    #[prost(message, optional, tag = "5")]
    pub failure: Option<Failure>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignaledAttributes {
    #[prost(string, tag = "1")]
    pub signal_name: String,
    #[prost(message, optional, tag = "2")]
    pub input: Option<Payloads>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TerminatedAttributes {
    #[prost(string, tag = "1")]
    pub reason: String,
    #[prost(message, optional, tag = "2")]
    pub details: Option<Payloads>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CancelRequestedAttributes {
    #[prost(string, tag = "1")]
    pub cause: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ContinuedAsNewAttributes {
    #[prost(string, tag = "1")]
    pub new_execution_run_id: String,
    #[prost(message, optional, tag = "2")]
    pub workflow_type: Option<NamedType>,
    #[prost(message, optional, tag = "3")]
    pub task_queue: Option<NamedType>,
    #[prost(message, optional, tag = "4")]
    pub input: Option<Payloads>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StartChildInitiatedAttributes {
    #[prost(string, tag = "1")]
    pub namespace: String,
    #[prost(string, tag = "2")]
    pub workflow_id: String,
    #[prost(message, optional, tag = "3")]
    pub workflow_type: Option<NamedType>,
    #[prost(message, optional, tag = "4")]
    pub task_queue: Option<NamedType>,
    #[prost(message, optional, tag = "5")]
    pub input: Option<Payloads>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StartChildFailedAttributes {
    #[prost(string, tag = "2")]
    pub workflow_id: String,
    #[prost(message, optional, tag = "3")]
    pub workflow_type: Option<NamedType>,
    #[prost(int32, tag = "4")]
    pub cause: i32,
    #[prost(int64, tag = "6")]
    pub initiated_event_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChildStartedAttributes {
    #[prost(int64, tag = "2")]
    pub initiated_event_id: i64,
    #[prost(message, optional, tag = "3")]
    pub workflow_execution: Option<WorkflowExecution>,
    #[prost(message, optional, tag = "4")]
    pub workflow_type: Option<NamedType>,
}

/// Shared by child completion (result) and cancellation (details)
#[derive(Clone, PartialEq, Message)]
pub struct ChildResultAttributes {
    #[prost(message, optional, tag = "1")]
    pub payloads: Option<Payloads>,
    #[prost(message, optional, tag = "3")]
    pub workflow_execution: Option<WorkflowExecution>,
    #[prost(message, optional, tag = "4")]
    pub workflow_type: Option<NamedType>,
    #[prost(int64, tag = "5")]
    pub initiated_event_id: i64,
    #[prost(int64, tag = "6")]
    pub started_event_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChildFailureAttributes {
    #[prost(message, optional, tag = "1")]
    pub failure: Option<Failure>,
    #[prost(message, optional, tag = "3")]
    pub workflow_execution: Option<WorkflowExecution>,
    #[prost(message, optional, tag = "4")]
    pub workflow_type: Option<NamedType>,
    #[prost(int64, tag = "5")]
    pub initiated_event_id: i64,
    #[prost(int64, tag = "6")]
    pub started_event_id: i64,
}

/// Shared by child timeout and termination
#[derive(Clone, PartialEq, Message)]
pub struct ChildClosedAttributes {
    #[prost(message, optional, tag = "2")]
    pub workflow_execution: Option<WorkflowExecution>,
    #[prost(message, optional, tag = "3")]
    pub workflow_type: Option<NamedType>,
    #[prost(int64, tag = "4")]
    pub initiated_event_id: i64,
    #[prost(int64, tag = "5")]
    pub started_event_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignalExternalInitiatedAttributes {
    #[prost(string, tag = "2")]
    pub namespace: String,
    #[prost(message, optional, tag = "3")]
    pub workflow_execution: Option<WorkflowExecution>,
    #[prost(string, tag = "4")]
    pub signal_name: String,
    #[prost(message, optional, tag = "5")]
    pub input: Option<Payloads>,
    #[prost(bool, tag = "7")]
    pub child_workflow_only: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignalExternalFailedAttributes {
    #[prost(int32, tag = "1")]
    pub cause: i32,
    #[prost(message, optional, tag = "4")]
    pub workflow_execution: Option<WorkflowExecution>,
    #[prost(int64, tag = "5")]
    pub initiated_event_id: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ExternalSignaledAttributes {
    #[prost(int64, tag = "1")]
    pub initiated_event_id: i64,
    #[prost(message, optional, tag = "3")]
    pub workflow_execution: Option<WorkflowExecution>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SearchAttributes {
    #[prost(map = "string, message", tag = "1")]
    pub indexed_fields: HashMap<String, Payload>,
}

#[derive(Clone, PartialEq, Message)]
pub struct UpsertSearchAttributesAttributes {
    #[prost(message, optional, tag = "2")]
    pub search_attributes: Option<SearchAttributes>,
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a binary history message
pub fn history_from_protobuf(bytes: &[u8]) -> CoreResult<History> {
    let history = HistoryProto::decode(bytes)?;
    let events = history
        .events
        .into_iter()
        .map(convert_event)
        .collect::<CoreResult<Vec<_>>>()?;

    Ok(History::new(events))
}

fn convert_event(event: HistoryEventProto) -> CoreResult<HistoryEvent> {
    let event_type = EventType::from_code(event.event_type).ok_or_else(|| {
        CoreError::InvalidHistory(format!(
            "unknown event type code {} on event {}",
            event.event_type, event.event_id
        ))
    })?;

    let timestamp = event
        .event_time
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.seconds, t.nanos.max(0) as u32))
        .unwrap_or_default();

    let attributes = event
        .attributes
        .map(attributes_to_json)
        .unwrap_or_else(|| Value::Object(Map::new()));

    Ok(HistoryEvent::new(event.event_id, event_type, timestamp, attributes))
}

fn attributes_to_json(attributes: history_event::Attributes) -> Value {
    use history_event::Attributes::*;

    match attributes {
        WorkflowExecutionStarted(a) => json!({
            "workflowType": named(a.workflow_type),
            "taskQueue": named(a.task_queue),
            "input": payloads(a.input),
            "originalExecutionRunId": a.original_execution_run_id,
            "firstExecutionRunId": a.first_execution_run_id,
            "attempt": a.attempt,
        }),
        WorkflowExecutionCompleted(a) => json!({ "result": payloads(a.result) }),
        WorkflowExecutionFailed(a) => json!({ "failure": failure(a.failure) }),
        WorkflowTaskStarted(a) => json!({
            "scheduledEventId": a.scheduled_event_id,
            "suggestContinueAsNew": a.suggest_continue_as_new,
            "historySizeBytes": a.history_size_bytes,
        }),
        WorkflowTaskCompleted(a) => json!({
            "scheduledEventId": a.scheduled_event_id,
            "startedEventId": a.started_event_id,
            "sdkMetadata": a.sdk_metadata.map(|m| json!({
                "coreUsedFlags": m.core_used_flags,
                "langUsedFlags": m.lang_used_flags,
            })),
        }),
        ActivityTaskScheduled(a) => json!({
            "activityId": a.activity_id,
            "activityType": named(a.activity_type),
            "input": payloads(a.input),
        }),
        ActivityTaskStarted(a) => json!({
            "scheduledEventId": a.scheduled_event_id,
            "attempt": a.attempt,
        }),
        ActivityTaskCompleted(a) => json!({
            "result": payloads(a.result),
            "scheduledEventId": a.scheduled_event_id,
            "startedEventId": a.started_event_id,
        }),
        ActivityTaskFailed(a) | ActivityTaskTimedOut(a) => json!({
            "failure": failure(a.failure),
            "scheduledEventId": a.scheduled_event_id,
            "startedEventId": a.started_event_id,
        }),
        TimerStarted(a) => json!({
            "timerId": a.timer_id,
            "startToFireTimeout": a.start_to_fire_timeout.map(|d| format!("{}s", d.seconds)),
        }),
        TimerFired(a) | TimerCanceled(a) => json!({
            "timerId": a.timer_id,
            "startedEventId": a.started_event_id,
        }),
        ActivityTaskCancelRequested(a) => json!({ "scheduledEventId": a.scheduled_event_id }),
        ActivityTaskCanceled(a) => json!({
            "details": payloads(a.details),
            "latestCancelRequestedEventId": a.latest_cancel_requested_event_id,
            "scheduledEventId": a.scheduled_event_id,
            "startedEventId": a.started_event_id,
        }),
        MarkerRecorded(a) => json!({
            "markerName": a.marker_name,
            "details": a
                .details
                .into_iter()
                .map(|(key, value)| (key, payloads(Some(value))))
                .collect::<Map<String, Value>>(),
            "failure": failure(a.failure),
        }),
        WorkflowExecutionSignaled(a) => json!({
            "signalName": a.signal_name,
            "input": payloads(a.input),
        }),
        WorkflowExecutionTerminated(a) => json!({
            "reason": a.reason,
            "details": payloads(a.details),
        }),
        WorkflowExecutionCancelRequested(a) => json!({ "cause": a.cause }),
        WorkflowExecutionContinuedAsNew(a) => json!({
            "newExecutionRunId": a.new_execution_run_id,
            "workflowType": named(a.workflow_type),
            "taskQueue": named(a.task_queue),
            "input": payloads(a.input),
        }),
        StartChildWorkflowExecutionInitiated(a) => json!({
            "namespace": a.namespace,
            "workflowId": a.workflow_id,
            "workflowType": named(a.workflow_type),
            "taskQueue": named(a.task_queue),
            "input": payloads(a.input),
        }),
        StartChildWorkflowExecutionFailed(a) => json!({
            "workflowId": a.workflow_id,
            "workflowType": named(a.workflow_type),
            "cause": a.cause,
            "initiatedEventId": a.initiated_event_id,
        }),
        ChildWorkflowExecutionStarted(a) => json!({
            "initiatedEventId": a.initiated_event_id,
            "workflowExecution": execution(a.workflow_execution),
            "workflowType": named(a.workflow_type),
        }),
        ChildWorkflowExecutionCompleted(a) => json!({
            "result": payloads(a.payloads),
            "workflowExecution": execution(a.workflow_execution),
            "workflowType": named(a.workflow_type),
            "initiatedEventId": a.initiated_event_id,
            "startedEventId": a.started_event_id,
        }),
        ChildWorkflowExecutionCanceled(a) => json!({
            "details": payloads(a.payloads),
            "workflowExecution": execution(a.workflow_execution),
            "workflowType": named(a.workflow_type),
            "initiatedEventId": a.initiated_event_id,
            "startedEventId": a.started_event_id,
        }),
        ChildWorkflowExecutionFailed(a) => json!({
            "failure": failure(a.failure),
            "workflowExecution": execution(a.workflow_execution),
            "workflowType": named(a.workflow_type),
            "initiatedEventId": a.initiated_event_id,
            "startedEventId": a.started_event_id,
        }),
        ChildWorkflowExecutionTimedOut(a) | ChildWorkflowExecutionTerminated(a) => json!({
            "workflowExecution": execution(a.workflow_execution),
            "workflowType": named(a.workflow_type),
            "initiatedEventId": a.initiated_event_id,
            "startedEventId": a.started_event_id,
        }),
        SignalExternalWorkflowExecutionInitiated(a) => json!({
            "namespace": a.namespace,
            "workflowExecution": execution(a.workflow_execution),
            "signalName": a.signal_name,
            "input": payloads(a.input),
            "childWorkflowOnly": a.child_workflow_only,
        }),
        SignalExternalWorkflowExecutionFailed(a) => json!({
            "cause": a.cause,
            "workflowExecution": execution(a.workflow_execution),
            "initiatedEventId": a.initiated_event_id,
        }),
        ExternalWorkflowExecutionSignaled(a) => json!({
            "initiatedEventId": a.initiated_event_id,
            "workflowExecution": execution(a.workflow_execution),
        }),
        UpsertWorkflowSearchAttributes(a) => json!({
            "searchAttributes": {
                "indexedFields": a
                    .search_attributes
                    .map(|s| s.indexed_fields)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(key, value)| (key, payload(value)))
                    .collect::<Map<String, Value>>(),
            },
        }),
    }
}

fn named(value: Option<NamedType>) -> Value {
    value.map_or(Value::Null, |v| json!({ "name": v.name }))
}

fn execution(value: Option<WorkflowExecution>) -> Value {
    value.map_or(Value::Null, |v| {
        json!({ "workflowId": v.workflow_id, "runId": v.run_id })
    })
}

fn payload(payload: Payload) -> Value {
    let metadata: Map<String, Value> = payload
        .metadata
        .into_iter()
        .map(|(key, value)| (key, Value::String(STANDARD.encode(value))))
        .collect();
    json!({ "metadata": metadata, "data": STANDARD.encode(payload.data) })
}

fn payloads(value: Option<Payloads>) -> Value {
    value.map_or(Value::Null, |p| {
        json!({ "payloads": p.payloads.into_iter().map(payload).collect::<Vec<_>>() })
    })
}

fn failure(value: Option<Failure>) -> Value {
    let Some(f) = value else {
        return Value::Null;
    };

    let mut out = Map::new();
    out.insert("message".into(), json!(f.message));
    out.insert("source".into(), json!(f.source));
    out.insert("stackTrace".into(), json!(f.stack_trace));
    match f.info {
        Some(failure::Info::Application(info)) => {
            out.insert(
                "applicationFailureInfo".into(),
                json!({
                    "type": info.r#type,
                    "nonRetryable": info.non_retryable,
                    "details": payloads(info.details),
                }),
            );
        }
        Some(failure::Info::Timeout(info)) => {
            out.insert(
                "timeoutFailureInfo".into(),
                json!({ "timeoutType": timeout_type_name(info.timeout_type) }),
            );
        }
        Some(failure::Info::Canceled(info)) => {
            out.insert(
                "canceledFailureInfo".into(),
                json!({ "details": payloads(info.details) }),
            );
        }
        Some(failure::Info::Terminated(_)) => {
            out.insert("terminatedFailureInfo".into(), json!({}));
        }
        None => {}
    }
    if let Some(cause) = f.cause {
        out.insert("cause".into(), failure(Some(*cause)));
    }
    Value::Object(out)
}

fn timeout_type_name(code: i32) -> &'static str {
    match code {
        1 => "TIMEOUT_TYPE_START_TO_CLOSE",
        2 => "TIMEOUT_TYPE_SCHEDULE_TO_START",
        3 => "TIMEOUT_TYPE_SCHEDULE_TO_CLOSE",
        4 => "TIMEOUT_TYPE_HEARTBEAT",
        _ => "TIMEOUT_TYPE_UNSPECIFIED",
    }
}
