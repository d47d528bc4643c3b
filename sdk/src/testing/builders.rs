//! Fluent construction of histories for tests.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration;
use weft_core::workflow::event::EVENT_TYPE_PREFIX;
use weft_core::workflow::payload::{encode_payload, encode_payloads};
use weft_core::{EventType, FailureInfo, History, HistoryEvent, SdkFlag};

/// Builder for histories as the server would record them.
///
/// Event ids are assigned in order starting at 1; every method that records
/// an operation's start returns the builder, and [`last_id`](Self::last_id)
/// gives the id to point completions at.
///
/// # Example
///
/// ```ignore
/// use weft_sdk::testing::HistoryBuilder;
/// use serde_json::json;
///
/// let mut history = HistoryBuilder::started("Greeter", json!("Ada")).workflow_task();
/// let scheduled = history.next_id();
/// let history = history
///     .activity_scheduled("5", "Greet")
///     .activity_completed(scheduled, json!("Hello, Ada"))
///     .workflow_task()
///     .workflow_completed(json!("Hello, Ada"))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct HistoryBuilder {
    events: Vec<HistoryEvent>,
    now: DateTime<Utc>,
}

impl HistoryBuilder {
    /// Start a history with a `WorkflowExecutionStarted` event
    pub fn started(workflow_type: &str, input: Value) -> Self {
        let input = match input {
            Value::Null => Value::Null,
            input => encode_payloads(&[input]),
        };
        Self::empty().event(
            EventType::WorkflowExecutionStarted,
            json!({
                "workflowType": {"name": workflow_type},
                "taskQueue": {"name": "default"},
                "input": input,
                "attempt": 1,
            }),
        )
    }

    /// Builder without any events
    pub fn empty() -> Self {
        Self {
            events: Vec::new(),
            now: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default(),
        }
    }

    /// Id the next recorded event will get
    pub fn next_id(&self) -> i64 {
        self.events.len() as i64 + 1
    }

    /// Id of the last recorded event
    pub fn last_id(&self) -> i64 {
        self.events.len() as i64
    }

    /// Move the clock forward for the events that follow
    pub fn advance(mut self, by: Duration) -> Self {
        self.now += chrono::Duration::milliseconds(by.as_millis() as i64);
        self
    }

    /// Record an arbitrary event
    pub fn event(mut self, event_type: EventType, attributes: Value) -> Self {
        let id = self.next_id();
        self.events.push(HistoryEvent::new(id, event_type, self.now, attributes));
        self
    }

    /// A completed workflow task (scheduled, started, completed)
    pub fn workflow_task(self) -> Self {
        self.workflow_task_with_flags(&[])
    }

    /// A completed workflow task that recorded the given SDK flags
    pub fn workflow_task_with_flags(self, flags: &[SdkFlag]) -> Self {
        let codes: Vec<u32> = flags.iter().map(SdkFlag::code).collect();
        let scheduled = self.next_id();
        self.workflow_task_started().event(
            EventType::WorkflowTaskCompleted,
            json!({
                "scheduledEventId": scheduled,
                "startedEventId": scheduled + 1,
                "sdkMetadata": {"langUsedFlags": codes},
            }),
        )
    }

    /// A workflow task handed to the worker but not completed yet
    pub fn workflow_task_started(self) -> Self {
        let scheduled = self.next_id();
        self.event(EventType::WorkflowTaskScheduled, json!({}))
            .event(
                EventType::WorkflowTaskStarted,
                json!({"scheduledEventId": scheduled, "historySizeBytes": 0}),
            )
    }

    pub fn activity_scheduled(self, activity_id: &str, activity_type: &str) -> Self {
        self.event(
            EventType::ActivityTaskScheduled,
            json!({"activityId": activity_id, "activityType": {"name": activity_type}}),
        )
    }

    pub fn activity_completed(self, scheduled_event_id: i64, result: Value) -> Self {
        self.event(
            EventType::ActivityTaskCompleted,
            json!({"scheduledEventId": scheduled_event_id, "result": encode_payloads(&[result])}),
        )
    }

    pub fn activity_failed(self, scheduled_event_id: i64, failure: FailureInfo) -> Self {
        self.event(
            EventType::ActivityTaskFailed,
            json!({"scheduledEventId": scheduled_event_id, "failure": failure}),
        )
    }

    pub fn timer_started(self, timer_id: &str, timeout: Duration) -> Self {
        self.event(
            EventType::TimerStarted,
            json!({"timerId": timer_id, "startToFireTimeout": format!("{}s", timeout.as_secs())}),
        )
    }

    pub fn timer_fired(self, started_event_id: i64) -> Self {
        let timer_id = started_event_id.to_string();
        self.event(
            EventType::TimerFired,
            json!({"timerId": timer_id, "startedEventId": started_event_id}),
        )
    }

    /// A marker with its details payload-encoded
    pub fn marker(self, name: &str, details: Map<String, Value>) -> Self {
        let details: Map<String, Value> = details
            .into_iter()
            .map(|(key, value)| (key, encode_payloads(&[value])))
            .collect();
        self.event(
            EventType::MarkerRecorded,
            json!({"markerName": name, "details": details}),
        )
    }

    pub fn signaled(self, signal_name: &str, input: Value) -> Self {
        self.event(
            EventType::WorkflowExecutionSignaled,
            json!({"signalName": signal_name, "input": encode_payloads(&[input])}),
        )
    }

    pub fn search_attributes_upserted(self, attributes: Map<String, Value>) -> Self {
        let indexed: Map<String, Value> = attributes
            .iter()
            .map(|(key, value)| (key.clone(), encode_payload(value)))
            .collect();
        self.event(
            EventType::UpsertWorkflowSearchAttributes,
            json!({"searchAttributes": {"indexedFields": indexed}}),
        )
    }

    pub fn workflow_completed(self, result: Value) -> Self {
        self.event(
            EventType::WorkflowExecutionCompleted,
            json!({"result": encode_payloads(&[result])}),
        )
    }

    pub fn workflow_failed(self, failure: FailureInfo) -> Self {
        self.event(EventType::WorkflowExecutionFailed, json!({"failure": failure}))
    }

    pub fn continued_as_new(self, workflow_type: &str) -> Self {
        self.event(
            EventType::WorkflowExecutionContinuedAsNew,
            json!({"workflowType": {"name": workflow_type}}),
        )
    }

    /// Recorded events so far
    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn build(self) -> History {
        History::new(self.events)
    }

    /// The history as a JSON history document
    pub fn to_json(&self) -> String {
        let events: Vec<Value> = self
            .events
            .iter()
            .map(|event| {
                let mut document = Map::new();
                document.insert("eventId".into(), Value::String(event.id().to_string()));
                document.insert("eventTime".into(), json!(event.timestamp()));
                document.insert(
                    "eventType".into(),
                    Value::String(format!("{}{}", EVENT_TYPE_PREFIX, event.event_type().as_str())),
                );
                document.insert(
                    attributes_key(event.event_type()),
                    event.attributes().clone(),
                );
                Value::Object(document)
            })
            .collect();

        json!({ "events": events }).to_string()
    }
}

/// `WORKFLOW_TASK_STARTED` -> `workflowTaskStartedEventAttributes`
fn attributes_key(event_type: EventType) -> String {
    let mut key = String::new();
    for (idx, word) in event_type.as_str().split('_').enumerate() {
        let word = word.to_ascii_lowercase();
        if idx == 0 {
            key.push_str(&word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                key.push(first.to_ascii_uppercase());
                key.push_str(chars.as_str());
            }
        }
    }
    key.push_str("EventAttributes");
    key
}
