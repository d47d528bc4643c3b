//! WorkflowExecutor - drives workflow code through its history
//!
//! The executor replays a history window by window. Markers of a window are
//! recorded first; the remaining events are applied in order and after each
//! one the workflow coroutine is polled, so workflow code resumes exactly
//! where the event resolved one of its futures. Commands issued during the
//! replayed part must match the command events recorded in history; what
//! remains once the last window is applied is the new decision list.

use crate::config::ExecutorConfig;
use crate::error::Result;
use crate::worker::registry::RegisteredWorkflow;
use crate::workflow::context::WorkflowContext;
use crate::workflow::dispatcher::{Dispatcher, Notification, NotificationKind};
use crate::workflow::failure::ErrorRegistry;
use crate::workflow::metadata::WorkflowMetadata;
use crate::workflow::query_registry::{QueryError, QueryRegistry};
use crate::workflow::stack_trace::{StackTraceTracker, STACK_TRACE_QUERY_NAME};
use crate::workflow::state_manager::StateManager;
use futures::future::BoxFuture;
use futures::task::noop_waker;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, error, info_span, trace};
use weft_core::{
    Command, CoreError, CoreResult, EventTarget, History, HistoryWindow, InternalError, SdkFlag,
};

/// Outcome of replaying a history
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Commands issued past the end of the recorded history
    pub commands: Vec<Command>,
    /// SDK flags this run turned on that history did not record yet
    pub new_sdk_flags_used: BTreeSet<SdkFlag>,
}

/// A query to answer against the replayed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowQuery {
    pub query_type: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResult {
    Answer(Value),
    Failure(String),
}

/// Replays one workflow run. Single use: build a new executor per task.
pub struct WorkflowExecutor {
    workflow: Arc<RegisteredWorkflow>,
    history: History,
    config: ExecutorConfig,
    state: Arc<Mutex<StateManager>>,
    dispatcher: Arc<Dispatcher>,
    queries: Arc<QueryRegistry>,
    tracker: Option<StackTraceTracker>,
    context: WorkflowContext,
    start_input: Arc<Mutex<Option<Value>>>,
    coroutine: Option<BoxFuture<'static, Result<Value>>>,
}

impl WorkflowExecutor {
    pub fn new(
        workflow: Arc<RegisteredWorkflow>,
        history: History,
        metadata: WorkflowMetadata,
        config: ExecutorConfig,
        errors: Arc<ErrorRegistry>,
    ) -> CoreResult<Self> {
        let metadata = match history.first_event() {
            Some(event) => metadata.with_start_event(event)?,
            None => metadata,
        };

        let state = Arc::new(Mutex::new(StateManager::new(
            config.clone(),
            errors,
            metadata.run_id.clone(),
        )));
        let dispatcher = Arc::new(Dispatcher::new());
        let queries = Arc::new(QueryRegistry::new());
        let tracker = config.capture_stack_trace.then(StackTraceTracker::new);

        if let Some(tracker) = &tracker {
            let tracker = tracker.clone();
            queries.register(STACK_TRACE_QUERY_NAME, move |_| Ok(Value::String(tracker.to_string())));
        }

        let start_input = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&start_input);
        dispatcher.register_handler(
            EventTarget::workflow(),
            Some(NotificationKind::Started),
            move |notification| {
                if let Notification::Started(input) = notification {
                    *slot.lock() = Some(input.clone());
                }
                Ok(())
            },
        );

        let context = WorkflowContext::new(
            Arc::clone(&state),
            Arc::clone(&dispatcher),
            Arc::clone(&queries),
            metadata,
            tracker.clone(),
        );

        Ok(Self {
            workflow,
            history,
            config,
            state,
            dispatcher,
            queries,
            tracker,
            context,
            start_input,
            coroutine: None,
        })
    }

    pub fn metadata(&self) -> &WorkflowMetadata {
        self.context.metadata()
    }

    /// Replay the whole history and collect the new commands
    pub fn run(&mut self) -> CoreResult<RunResult> {
        let span = info_span!(
            "workflow_task",
            workflow_type = %self.metadata().workflow_type,
            workflow_id = %self.metadata().workflow_id,
        );
        let _entered = span.enter();

        self.replay().map_err(|e| {
            match &e {
                CoreError::Internal(InternalError::NonDeterministicWorkflow(cause)) => {
                    error!(error = %cause, "Workflow code diverged from its history")
                }
                other => error!(error = %other, "Workflow task failed"),
            }
            e
        })
    }

    fn replay(&mut self) -> CoreResult<RunResult> {
        let windows = self.history.collect_windows()?;
        for window in &windows {
            self.apply_window(window)?;
        }

        let state = self.state.lock();
        let commands = state.final_commands();
        if commands.len() > self.config.max_commands_per_task {
            return Err(InternalError::TooManyCommands {
                count: commands.len(),
                limit: self.config.max_commands_per_task,
            }
            .into());
        }

        debug!(commands = commands.len(), "Workflow task replayed");
        Ok(RunResult {
            commands,
            new_sdk_flags_used: state.new_sdk_flags_used().clone(),
        })
    }

    fn apply_window(&mut self, window: &HistoryWindow) -> CoreResult<()> {
        let signals_first = self.state.lock().start_window(window);
        trace!(
            replay = window.is_replay(),
            signals_first,
            events = window.events().len(),
            "Applying window"
        );

        for marker in window.markers() {
            self.state.lock().apply_marker(marker)?;
        }

        for event in window.ordered_events(signals_first) {
            let dispatches = self.state.lock().apply_event(event)?;
            for (target, notification) in dispatches {
                let handled = self.dispatcher.dispatch(target, &notification)?;
                trace!(event_id = event.id(), %target, handled, "Dispatched");
            }

            self.start_coroutine();
            self.poll()?;
        }
        Ok(())
    }

    fn start_coroutine(&mut self) {
        let input = self.start_input.lock().take();
        if let Some(input) = input {
            debug!(workflow_type = %self.workflow.info.kind, "Starting workflow code");
            self.coroutine = Some(self.workflow.start(self.context.clone(), input));
        }
    }

    /// Let workflow code run until it suspends again
    fn poll(&mut self) -> CoreResult<()> {
        if let Some(coroutine) = self.coroutine.as_mut() {
            let waker = noop_waker();
            let mut cx = Context::from_waker(&waker);
            if let Poll::Ready(result) = coroutine.as_mut().poll(&mut cx) {
                self.coroutine = None;
                self.finish(result);
            }
        }

        let fatal = self.state.lock().take_fatal();
        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn finish(&self, result: Result<Value>) {
        if self.context.is_completed() {
            return;
        }
        match result {
            Ok(value) => self.context.complete(value),
            Err(e) => self.context.fail(&e),
        }
    }

    /// Whether workflow code returned
    pub fn is_finished(&self) -> bool {
        self.coroutine.is_none() && self.start_input.lock().is_none() && self.context.is_completed()
    }

    /// Where workflow code is suspended, if stack traces are captured
    pub fn stack_trace(&self) -> Option<String> {
        self.tracker.as_ref().map(ToString::to_string)
    }

    pub fn query(&self, query_type: &str, args: Value) -> std::result::Result<Value, QueryError> {
        self.queries.handle(query_type, args)
    }

    /// Answer queries against the replayed state, keyed like the input
    pub fn process_queries(&self, queries: &BTreeMap<String, WorkflowQuery>) -> BTreeMap<String, QueryResult> {
        queries
            .iter()
            .map(|(id, query)| {
                let result = match self.query(&query.query_type, query.args.clone()) {
                    Ok(answer) => QueryResult::Answer(answer),
                    Err(e) => {
                        debug!(query_id = %id, error = %e, "Query failed");
                        QueryResult::Failure(e.to_string())
                    }
                };
                (id.clone(), result)
            })
            .collect()
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("workflow", &self.workflow.info.kind)
            .field("context", &self.context)
            .field("events", &self.history.len())
            .finish()
    }
}
