//! JSON history documents, as exported by the server tooling.
//!
//! ```json
//! {"events": [{"eventId": "1", "eventTime": "2024-01-01T00:00:00Z",
//!   "eventType": "EVENT_TYPE_WORKFLOW_EXECUTION_STARTED",
//!   "workflowExecutionStartedEventAttributes": {...}}]}
//! ```

use crate::error::{CoreError, CoreResult};
use crate::workflow::event::{normalize_event_type_name, value_as_i64, EVENT_TYPE_PREFIX};
use crate::workflow::{EventType, History, HistoryEvent};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Deserialize)]
struct RawHistory {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    event_id: Value,
    #[serde(default)]
    event_time: Option<DateTime<Utc>>,
    event_type: EventType,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Parse a JSON history document
pub fn history_from_json(json: &str) -> CoreResult<History> {
    let raw: RawHistory = serde_json::from_str(json)?;
    let events = raw
        .events
        .into_iter()
        .map(convert_event)
        .collect::<CoreResult<Vec<_>>>()?;

    Ok(History::new(events))
}

fn convert_event(raw: RawEvent) -> CoreResult<HistoryEvent> {
    let id = value_as_i64(&raw.event_id)
        .ok_or_else(|| CoreError::InvalidHistory(format!("invalid eventId {}", raw.event_id)))?;

    let attributes = raw
        .rest
        .into_iter()
        .find(|(key, _)| key.ends_with("EventAttributes"))
        .map(|(_, value)| value)
        .unwrap_or_else(|| Value::Object(Map::new()));

    Ok(HistoryEvent::new(
        id,
        raw.event_type,
        raw.event_time.unwrap_or_default(),
        attributes,
    ))
}

/// Rewrite event type names into the canonical `EVENT_TYPE_*` form.
///
/// Older tooling exported `"eventType": "WorkflowTaskScheduled"`; this turns
/// such a document into `"EVENT_TYPE_WORKFLOW_TASK_SCHEDULED"`.
pub fn correct_event_types(json: &str) -> CoreResult<String> {
    let mut document: Value = serde_json::from_str(json)?;

    if let Some(events) = document.get_mut("events").and_then(|e| e.as_array_mut()) {
        for event in events {
            if let Some(event_type) = event.get_mut("eventType") {
                if let Some(name) = event_type.as_str() {
                    *event_type = Value::String(format!(
                        "{}{}",
                        EVENT_TYPE_PREFIX,
                        normalize_event_type_name(name)
                    ));
                }
            }
        }
    }

    Ok(serde_json::to_string(&document)?)
}
