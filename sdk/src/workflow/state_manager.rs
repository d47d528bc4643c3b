//! Replay state of one workflow run.
//!
//! The state manager assigns ids to commands as workflow code issues them,
//! matches recorded command events against those commands during replay and
//! translates every other event into a [`Notification`] for the dispatcher.

use crate::config::ExecutorConfig;
use crate::workflow::dispatcher::Notification;
use crate::workflow::failure::{ErrorRegistry, Failure};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;
use weft_core::workflow::payload::{collapse, decode_payload_map, decode_payloads};
use weft_core::{
    Command, CoreResult, EventTarget, EventType, FailureInfo, HistoryEvent, HistoryWindow,
    InternalError, NonDeterminismError, SdkFlag,
};

pub(crate) const SIDE_EFFECT_MARKER: &str = "SIDE_EFFECT";
pub(crate) const RELEASE_MARKER: &str = "RELEASE";

/// A notification to deliver to the handlers of a target
pub(crate) type Dispatch = (EventTarget, Notification);

/// Result of scheduling a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scheduled {
    pub target: EventTarget,
    pub cancelation_id: Option<String>,
}

pub(crate) struct StateManager {
    commands: VecDeque<(i64, Command)>,
    marker_ids: HashSet<i64>,
    releases: HashMap<String, bool>,
    side_effects: VecDeque<(i64, Value)>,
    last_event_id: i64,
    local_time: Option<DateTime<Utc>>,
    replay: bool,
    search_attributes: Map<String, Value>,
    sdk_flags: BTreeSet<SdkFlag>,
    new_sdk_flags_used: BTreeSet<SdkFlag>,
    history_size_bytes: u64,
    suggest_continue_as_new: bool,
    save_signals: bool,
    fatal: Option<InternalError>,
    config: ExecutorConfig,
    errors: Arc<ErrorRegistry>,
    run_id: String,
}

impl StateManager {
    pub(crate) fn new(config: ExecutorConfig, errors: Arc<ErrorRegistry>, run_id: impl Into<String>) -> Self {
        Self {
            commands: VecDeque::new(),
            marker_ids: HashSet::new(),
            releases: HashMap::new(),
            side_effects: VecDeque::new(),
            last_event_id: 0,
            local_time: None,
            replay: false,
            search_attributes: Map::new(),
            sdk_flags: BTreeSet::new(),
            new_sdk_flags_used: BTreeSet::new(),
            history_size_bytes: 0,
            suggest_continue_as_new: false,
            save_signals: false,
            fatal: None,
            config,
            errors,
            run_id: run_id.into(),
        }
    }

    pub(crate) fn is_replaying(&self) -> bool {
        self.replay
    }

    pub(crate) fn local_time(&self) -> Option<DateTime<Utc>> {
        self.local_time
    }

    pub(crate) fn search_attributes(&self) -> &Map<String, Value> {
        &self.search_attributes
    }

    pub(crate) fn history_size_bytes(&self) -> u64 {
        self.history_size_bytes
    }

    pub(crate) fn suggest_continue_as_new(&self) -> bool {
        self.suggest_continue_as_new
    }

    pub(crate) fn saves_unhandled_signals(&self) -> bool {
        self.save_signals
    }

    pub(crate) fn new_sdk_flags_used(&self) -> &BTreeSet<SdkFlag> {
        &self.new_sdk_flags_used
    }

    /// Commands issued and not matched against history
    pub(crate) fn commands(&self) -> impl Iterator<Item = &(i64, Command)> {
        self.commands.iter()
    }

    pub(crate) fn final_commands(&self) -> Vec<Command> {
        self.commands.iter().map(|(_, c)| c.clone()).collect()
    }

    /// Keep the first engine error raised on behalf of workflow code
    pub(crate) fn record_fatal(&mut self, error: InternalError) {
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    pub(crate) fn take_fatal(&mut self) -> Option<InternalError> {
        self.fatal.take()
    }

    /// Assign the next event id to a command and queue it
    pub(crate) fn schedule(&mut self, mut command: Command) -> Result<Scheduled, InternalError> {
        self.validate_append(&command)?;

        // Markers may be removed from code, so their ids are never reused
        let mut command_id = self.next_event_id();
        while self.marker_ids.contains(&command_id) {
            command_id = self.next_event_id();
        }

        let cancelation_id = match &mut command {
            Command::ScheduleActivity(cmd) => {
                if cmd.activity_id.is_empty() {
                    cmd.activity_id = command_id.to_string();
                }
                Some(cmd.activity_id.clone())
            }
            Command::StartChildWorkflow(cmd) => {
                if cmd.workflow_id.is_empty() {
                    cmd.workflow_id = self.child_workflow_id(command_id);
                }
                Some(cmd.workflow_id.clone())
            }
            Command::StartTimer { timer_id, .. } => {
                if timer_id.is_empty() {
                    *timer_id = command_id.to_string();
                }
                Some(timer_id.clone())
            }
            Command::UpsertSearchAttributes { search_attributes } => {
                // Readable right away, not only after the next replay
                self.search_attributes
                    .extend(search_attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
                None
            }
            _ => None,
        };

        let target = EventTarget::new(command_id, command.target_type());
        trace!(command = command.kind(), %target, "Command scheduled");
        self.commands.push_back((command_id, command));

        Ok(Scheduled {
            target,
            cancelation_id,
        })
    }

    fn next_event_id(&mut self) -> i64 {
        self.last_event_id += 1;
        self.last_event_id
    }

    fn child_workflow_id(&self, command_id: i64) -> String {
        let name = format!("{}:{}", self.run_id, command_id);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    fn validate_append(&self, command: &Command) -> Result<(), InternalError> {
        let Some((_, previous)) = self.commands.back() else {
            return Ok(());
        };

        let context = match previous {
            Command::CompleteWorkflow { .. } => "The workflow completed",
            Command::FailWorkflow { .. } => "The workflow failed",
            Command::ContinueAsNew(_) => "The workflow continued as new",
            _ => return Ok(()),
        };

        Err(InternalError::WorkflowAlreadyCompleting(format!(
            "You cannot do anything in a Workflow after it completes. {}, but then it sent a new command: {}. \
             This can happen, for example, if you've not waited for all of your Activity futures before finishing the Workflow.",
            context,
            command.kind()
        )))
    }

    /// Next side effect value recorded in history, in recording order
    pub(crate) fn next_side_effect(&mut self) -> Option<Value> {
        self.side_effects.pop_front().map(|(_, value)| value)
    }

    /// Whether a release is active, recording it on first use in a live run
    pub(crate) fn release(&mut self, name: &str) -> Result<bool, InternalError> {
        if let Some(released) = self.releases.get(name) {
            return Ok(*released);
        }

        // A replay only honors releases recorded in history
        if self.replay {
            self.releases.insert(name.to_string(), false);
            return Ok(false);
        }

        self.releases.insert(name.to_string(), true);
        self.schedule(Command::RecordMarker {
            name: RELEASE_MARKER.to_string(),
            details: json!({ "data": name }),
        })?;
        Ok(true)
    }

    /// Take over the window's task state; returns whether signals go first
    pub(crate) fn start_window(&mut self, window: &HistoryWindow) -> bool {
        self.replay = window.is_replay();
        if let Some(local_time) = window.local_time() {
            self.local_time = Some(local_time);
        }
        if let Some(last_event_id) = window.last_event_id() {
            self.last_event_id = last_event_id;
        }
        self.sdk_flags.extend(window.sdk_flags().iter().copied());
        self.history_size_bytes = window.history_size_bytes();
        self.suggest_continue_as_new = window.suggest_continue_as_new();

        let has_signals = window
            .events()
            .iter()
            .any(|e| e.event_type() == EventType::WorkflowExecutionSignaled);

        self.save_signals = self.use_flag(
            SdkFlag::SaveFirstTaskSignals,
            has_signals && self.config.save_first_task_signals,
        );
        self.use_flag(
            SdkFlag::HandleSignalsFirst,
            has_signals && self.config.handle_signals_first,
        )
    }

    /// A flag recorded in history stays on; a new one is only turned on live
    fn use_flag(&mut self, flag: SdkFlag, wanted: bool) -> bool {
        if self.sdk_flags.contains(&flag) {
            return true;
        }
        if wanted && !self.replay {
            debug!(?flag, "Enabling SDK flag");
            self.sdk_flags.insert(flag);
            self.new_sdk_flags_used.insert(flag);
            return true;
        }
        false
    }

    /// Record a marker so replayed code reads the recorded value
    pub(crate) fn apply_marker(&mut self, event: &HistoryEvent) -> CoreResult<()> {
        self.marker_ids.insert(event.id());

        let details = decode_payload_map(event.get("details"))?;
        let data = details.get("data").cloned().unwrap_or(Value::Null);

        match event.get_str("markerName").unwrap_or_default() {
            SIDE_EFFECT_MARKER => self.side_effects.push_back((event.id(), data)),
            RELEASE_MARKER => {
                let name = match data {
                    Value::String(name) => name,
                    other => other.to_string(),
                };
                self.releases.insert(name, true);
            }
            other => return Err(InternalError::UnsupportedMarkerType(other.to_string()).into()),
        }
        Ok(())
    }

    /// Apply a non-marker event, returning the notifications it produces
    pub(crate) fn apply_event(&mut self, event: &HistoryEvent) -> CoreResult<Vec<Dispatch>> {
        use EventType::*;

        let target = EventTarget::from_event(event)?;
        trace!(event_id = event.id(), event_type = %event.event_type(), %target, "Applying event");

        let notification = match event.event_type() {
            WorkflowExecutionStarted => {
                self.merge_search_attributes(event)?;
                Some(Notification::Started(payloads(event, "input")?))
            }

            ActivityTaskScheduled
            | ActivityTaskCancelRequested
            | TimerStarted
            | StartChildWorkflowExecutionInitiated
            | SignalExternalWorkflowExecutionInitiated
            | WorkflowExecutionCompleted
            | WorkflowExecutionFailed
            | WorkflowExecutionContinuedAsNew => {
                self.discard_command(target)?;
                None
            }

            UpsertWorkflowSearchAttributes => {
                self.merge_search_attributes(event)?;
                self.discard_command(target)?;
                None
            }

            ActivityTaskStarted => None,
            ActivityTaskCompleted => Some(Notification::Completed(payloads(event, "result")?)),
            ActivityTaskFailed | ActivityTaskTimedOut | ChildWorkflowExecutionFailed => {
                Some(Notification::Failed(self.failure(event)))
            }
            ActivityTaskCanceled | ChildWorkflowExecutionCanceled => {
                Some(Notification::Failed(Failure::Canceled {
                    details: payloads(event, "details")?,
                }))
            }
            TimerFired => Some(Notification::Fired),
            TimerCanceled => {
                self.discard_command(target)?;
                Some(Notification::Canceled)
            }

            StartChildWorkflowExecutionFailed => Some(Notification::Failed(Failure::StartChildFailed {
                workflow_id: event.get_str("workflowId").unwrap_or_default().to_string(),
                cause: cause(event),
            })),
            ChildWorkflowExecutionStarted => Some(Notification::Started(
                event.get("workflowExecution").cloned().unwrap_or(Value::Null),
            )),
            ChildWorkflowExecutionCompleted => {
                Some(Notification::Completed(payloads(event, "result")?))
            }
            ChildWorkflowExecutionTimedOut => Some(Notification::Failed(Failure::ChildWorkflowTimeout)),
            ChildWorkflowExecutionTerminated => {
                Some(Notification::Failed(Failure::ChildWorkflowTerminated))
            }

            SignalExternalWorkflowExecutionFailed => {
                Some(Notification::Failed(Failure::ExternalSignalFailed {
                    cause: cause(event),
                }))
            }
            ExternalWorkflowExecutionSignaled => Some(Notification::Completed(Value::Null)),

            WorkflowExecutionSignaled => Some(Notification::Signaled {
                name: event.get_str("signalName").unwrap_or_default().to_string(),
                input: payloads(event, "input")?,
            }),

            WorkflowExecutionTimedOut
            | WorkflowExecutionCancelRequested
            | WorkflowExecutionCanceled
            | WorkflowExecutionTerminated
            | RequestCancelExternalWorkflowExecutionInitiated
            | RequestCancelExternalWorkflowExecutionFailed
            | ExternalWorkflowExecutionCancelRequested => None,

            other => return Err(InternalError::UnsupportedEvent(other.to_string()).into()),
        };

        Ok(notification.map(|n| (target, n)).into_iter().collect())
    }

    /// Match a recorded command event against the oldest issued command
    fn discard_command(&mut self, history_target: EventTarget) -> Result<(), InternalError> {
        let Some((replay_id, replay_command)) = self.commands.pop_front() else {
            return Err(NonDeterminismError::MissingCommand { history_target }.into());
        };

        let replay_target = EventTarget::new(replay_id, replay_command.target_type());
        if replay_target != history_target {
            return Err(NonDeterminismError::UnexpectedCommand {
                replay_target,
                history_target,
            }
            .into());
        }
        Ok(())
    }

    fn merge_search_attributes(&mut self, event: &HistoryEvent) -> CoreResult<()> {
        let indexed = event
            .get("searchAttributes")
            .and_then(|attributes| attributes.get("indexedFields"));
        self.search_attributes.extend(decode_payload_map(indexed)?);
        Ok(())
    }

    fn failure(&self, event: &HistoryEvent) -> Failure {
        match FailureInfo::from_attribute(event.get("failure")) {
            Some(info) => self.errors.failure_from(&info),
            None => Failure::Other {
                message: format!("{} without failure details", event.event_type()),
            },
        }
    }
}

fn payloads(event: &HistoryEvent, key: &str) -> CoreResult<Value> {
    Ok(collapse(decode_payloads(event.get(key))?))
}

fn cause(event: &HistoryEvent) -> String {
    match event.get("cause") {
        Some(Value::String(cause)) => cause.clone(),
        Some(other) => other.to_string(),
        None => "UNSPECIFIED".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::workflow::payload::encode_payloads;
    use weft_core::workflow::ScheduleActivity;
    use weft_core::{CoreError, History, TargetType};

    fn state() -> StateManager {
        StateManager::new(ExecutorConfig::DEFAULT, Arc::new(ErrorRegistry::new()), "run-1")
    }

    fn event(id: i64, event_type: EventType, attributes: Value) -> HistoryEvent {
        HistoryEvent::new(id, event_type, Utc::now(), attributes)
    }

    fn activity() -> Command {
        Command::ScheduleActivity(ScheduleActivity {
            activity_id: String::new(),
            activity_type: "Charge".into(),
            input: Value::Null,
            namespace: None,
            task_queue: None,
            retry_policy: None,
            timeouts: Default::default(),
            headers: Map::new(),
        })
    }

    #[test]
    fn test_schedule_assigns_sequential_ids() {
        let mut state = state();
        let first = state.schedule(activity()).unwrap();
        let timer = state
            .schedule(Command::StartTimer {
                timer_id: String::new(),
                timeout: std::time::Duration::from_secs(1),
            })
            .unwrap();

        assert_eq!(first.target, EventTarget::new(1, TargetType::Activity));
        assert_eq!(first.cancelation_id.as_deref(), Some("1"));
        assert_eq!(timer.target, EventTarget::new(2, TargetType::Timer));
        assert_eq!(timer.cancelation_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_schedule_skips_marker_ids() {
        let mut state = state();
        state
            .apply_marker(&event(
                1,
                EventType::MarkerRecorded,
                json!({
                    "markerName": SIDE_EFFECT_MARKER,
                    "details": { "data": encode_payloads(&[json!(42)]) },
                }),
            ))
            .unwrap();

        let scheduled = state.schedule(activity()).unwrap();
        assert_eq!(scheduled.target.id(), 2);
        assert_eq!(state.next_side_effect(), Some(json!(42)));
        assert_eq!(state.next_side_effect(), None);
    }

    #[test]
    fn test_command_after_completion_is_rejected() {
        let mut state = state();
        state
            .schedule(Command::CompleteWorkflow { result: Value::Null })
            .unwrap();

        let err = state.schedule(activity()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You cannot do anything in a Workflow after it completes. The workflow completed, but then it \
             sent a new command: ScheduleActivity. This can happen, for example, if you've not waited for \
             all of your Activity futures before finishing the Workflow."
        );
    }

    #[test]
    fn test_discard_matches_recorded_commands() {
        let mut state = state();
        state.schedule(activity()).unwrap();

        let dispatches = state
            .apply_event(&event(1, EventType::ActivityTaskScheduled, json!({})))
            .unwrap();
        assert!(dispatches.is_empty());
        assert_eq!(state.commands().count(), 0);
    }

    #[test]
    fn test_discard_reports_mismatch() {
        let mut state = state();
        state.schedule(activity()).unwrap();

        let err = state
            .apply_event(&event(1, EventType::TimerStarted, json!({})))
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Unexpected command. The replaying code is issuing: activity (1), but the history of previous executions recorded: timer (1)."));
    }

    #[test]
    fn test_discard_reports_missing_command() {
        let mut state = state();
        let err = state
            .apply_event(&event(5, EventType::WorkflowExecutionCompleted, json!({})))
            .unwrap_err();
        assert!(err.to_string().starts_with(
            "A command in the history of previous executions, complete_workflow (5), was not scheduled upon replay."
        ));
    }

    #[test]
    fn test_activity_completion_notifies_target() {
        let mut state = state();
        let dispatches = state
            .apply_event(&event(
                7,
                EventType::ActivityTaskCompleted,
                json!({"scheduledEventId": 5, "result": encode_payloads(&[json!("ok")])}),
            ))
            .unwrap();

        assert_eq!(dispatches.len(), 1);
        let (target, notification) = &dispatches[0];
        assert_eq!(*target, EventTarget::new(5, TargetType::Activity));
        assert!(matches!(notification, Notification::Completed(v) if v == &json!("ok")));
    }

    #[test]
    fn test_timer_fired_notifies_timer() {
        let mut state = state();
        let dispatches = state
            .apply_event(&event(
                7,
                EventType::TimerFired,
                json!({"timerId": "5", "startedEventId": 5}),
            ))
            .unwrap();

        assert_eq!(dispatches.len(), 1);
        let (target, notification) = &dispatches[0];
        assert_eq!(*target, EventTarget::new(5, TargetType::Timer));
        assert!(matches!(notification, Notification::Fired));
    }

    #[test]
    fn test_child_workflow_lifecycle_notifies_child() {
        let mut state = state();
        let execution = json!({"workflowId": "child-1", "runId": "child-run"});

        let started = state
            .apply_event(&event(
                6,
                EventType::ChildWorkflowExecutionStarted,
                json!({"initiatedEventId": 5, "workflowExecution": execution.clone()}),
            ))
            .unwrap();
        let (target, notification) = &started[0];
        assert_eq!(*target, EventTarget::new(5, TargetType::ChildWorkflow));
        assert!(matches!(notification, Notification::Started(v) if v == &execution));

        let completed = state
            .apply_event(&event(
                7,
                EventType::ChildWorkflowExecutionCompleted,
                json!({"initiatedEventId": 5, "result": encode_payloads(&[json!("child done")])}),
            ))
            .unwrap();
        let (target, notification) = &completed[0];
        assert_eq!(*target, EventTarget::new(5, TargetType::ChildWorkflow));
        assert!(matches!(notification, Notification::Completed(v) if v == &json!("child done")));
    }

    #[test]
    fn test_completion_without_back_reference_is_rejected() {
        let mut state = state();
        let err = state
            .apply_event(&event(7, EventType::ActivityTaskCompleted, json!({})))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidHistory(_)));
    }

    #[test]
    fn test_signal_goes_to_workflow() {
        let mut state = state();
        let dispatches = state
            .apply_event(&event(
                9,
                EventType::WorkflowExecutionSignaled,
                json!({"signalName": "approve", "input": encode_payloads(&[json!({"by": "ops"})])}),
            ))
            .unwrap();

        let (target, notification) = &dispatches[0];
        assert_eq!(*target, EventTarget::workflow());
        assert!(matches!(
            notification,
            Notification::Signaled { name, input } if name == "approve" && input == &json!({"by": "ops"})
        ));
    }

    #[test]
    fn test_unknown_marker_is_rejected() {
        let mut state = state();
        let err = state
            .apply_marker(&event(3, EventType::MarkerRecorded, json!({"markerName": "VERSION"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported marker type VERSION");
    }

    #[test]
    fn test_unsupported_event() {
        let mut state = state();
        let err = state
            .apply_event(&event(3, EventType::MarkerRecorded, json!({"markerName": "SIDE_EFFECT"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported event MARKER_RECORDED");
    }

    #[test]
    fn test_release_is_recorded_once_when_live() {
        let mut state = state();
        assert!(state.release("fix-123").unwrap());
        assert!(state.release("fix-123").unwrap());

        let commands = state.final_commands();
        assert_eq!(commands.len(), 1);
        assert!(matches!(&commands[0], Command::RecordMarker { name, .. } if name == RELEASE_MARKER));
    }

    #[test]
    fn test_release_during_replay_without_marker_is_off() {
        let mut state = state();
        let history = History::new(vec![
            event(1, EventType::WorkflowExecutionStarted, json!({})),
            event(2, EventType::WorkflowTaskScheduled, json!({})),
            event(3, EventType::WorkflowTaskStarted, json!({})),
            event(4, EventType::WorkflowTaskCompleted, json!({})),
        ]);
        let window = history.collect_windows().unwrap().remove(0);
        state.start_window(&window);

        assert!(state.is_replaying());
        assert!(!state.release("fix-123").unwrap());
        assert!(state.final_commands().is_empty());
    }

    #[test]
    fn test_signals_first_flag_is_reported_on_live_runs() {
        let mut state = state();
        let history = History::new(vec![
            event(1, EventType::WorkflowExecutionStarted, json!({})),
            event(2, EventType::WorkflowExecutionSignaled, json!({"signalName": "go"})),
            event(3, EventType::WorkflowTaskScheduled, json!({})),
            event(4, EventType::WorkflowTaskStarted, json!({})),
        ]);
        let window = history.collect_windows().unwrap().remove(0);

        assert!(state.start_window(&window));
        assert!(state.saves_unhandled_signals());
        let flags: Vec<SdkFlag> = state.new_sdk_flags_used().iter().copied().collect();
        assert_eq!(flags, vec![SdkFlag::HandleSignalsFirst, SdkFlag::SaveFirstTaskSignals]);
    }

    #[test]
    fn test_legacy_config_keeps_history_order() {
        let mut state = StateManager::new(ExecutorConfig::LEGACY, Arc::new(ErrorRegistry::new()), "run-1");
        let history = History::new(vec![
            event(1, EventType::WorkflowExecutionStarted, json!({})),
            event(2, EventType::WorkflowExecutionSignaled, json!({"signalName": "go"})),
            event(3, EventType::WorkflowTaskScheduled, json!({})),
            event(4, EventType::WorkflowTaskStarted, json!({})),
        ]);
        let window = history.collect_windows().unwrap().remove(0);

        assert!(!state.start_window(&window));
        assert!(state.new_sdk_flags_used().is_empty());
    }

    #[test]
    fn test_child_workflow_ids_are_deterministic() {
        let a = state().child_workflow_id(5);
        let b = state().child_workflow_id(5);
        let c = state().child_workflow_id(6);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
