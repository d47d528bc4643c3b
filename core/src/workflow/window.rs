//! Per workflow-task buffering of history events.

use crate::error::InternalError;
use crate::workflow::event::{value_as_i64, EventType, HistoryEvent};
use crate::workflow::sdk_flags::{parse_flags, SdkFlag};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Events belonging to one workflow task round.
///
/// Workflow task bookkeeping events never reach workflow code. They only
/// shape the window: the task start fixes the workflow's notion of "now" and
/// the id the next command will get, and the task completion marks the round
/// as replayed from stored history.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    events: Vec<HistoryEvent>,
    markers: Vec<HistoryEvent>,
    local_time: Option<DateTime<Utc>>,
    last_event_id: Option<i64>,
    replay: bool,
    sdk_flags: BTreeSet<SdkFlag>,
    history_size_bytes: u64,
    suggest_continue_as_new: bool,
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify and buffer an event
    pub fn add(&mut self, event: HistoryEvent) -> Result<(), InternalError> {
        match event.event_type() {
            EventType::MarkerRecorded => self.markers.push(event),
            EventType::WorkflowTaskScheduled => {}
            EventType::WorkflowTaskStarted => {
                // Reserve the slot of the task's own completion event
                self.last_event_id = Some(event.id() + 1);
                self.local_time = Some(event.timestamp());
                self.history_size_bytes = event
                    .get_i64("historySizeBytes")
                    .and_then(|size| u64::try_from(size).ok())
                    .unwrap_or(0);
                self.suggest_continue_as_new = event.get_bool("suggestContinueAsNew");
            }
            EventType::WorkflowTaskFailed | EventType::WorkflowTaskTimedOut => {
                self.last_event_id = None;
                self.local_time = None;
            }
            EventType::WorkflowTaskCompleted => {
                self.replay = true;
                let codes = used_flag_codes(&event);
                self.sdk_flags.extend(parse_flags(&codes)?);
            }
            _ => self.events.push(event),
        }
        Ok(())
    }

    /// Buffered replayable events, markers excluded, in history order
    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    /// Markers recorded in this window
    pub fn markers(&self) -> &[HistoryEvent] {
        &self.markers
    }

    /// Replayable events in application order.
    ///
    /// Workflow start first, then signals when `signals_first` is set, then
    /// everything else. Order inside each group follows history.
    pub fn ordered_events(&self, signals_first: bool) -> Vec<&HistoryEvent> {
        let rank = |event: &HistoryEvent| match event.event_type() {
            EventType::WorkflowExecutionStarted => 0,
            EventType::WorkflowExecutionSignaled if signals_first => 1,
            _ => 2,
        };

        let mut ordered: Vec<&HistoryEvent> = self.events.iter().collect();
        ordered.sort_by_key(|event| rank(*event));
        ordered
    }

    pub fn local_time(&self) -> Option<DateTime<Utc>> {
        self.local_time
    }

    pub fn last_event_id(&self) -> Option<i64> {
        self.last_event_id
    }

    /// True once the task's completion has been seen in history
    pub fn is_replay(&self) -> bool {
        self.replay
    }

    pub fn sdk_flags(&self) -> &BTreeSet<SdkFlag> {
        &self.sdk_flags
    }

    pub fn history_size_bytes(&self) -> u64 {
        self.history_size_bytes
    }

    pub fn suggest_continue_as_new(&self) -> bool {
        self.suggest_continue_as_new
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.markers.is_empty()
    }
}

fn used_flag_codes(event: &HistoryEvent) -> Vec<u32> {
    event
        .get("sdkMetadata")
        .and_then(|metadata| metadata.get("langUsedFlags"))
        .and_then(|flags| flags.as_array())
        .map(|flags| {
            flags
                .iter()
                .filter_map(value_as_i64)
                .filter_map(|code| u32::try_from(code).ok())
                .collect()
        })
        .unwrap_or_default()
}
