//! The handle workflow code uses to interact with its run.
//!
//! Every operation that must survive replay goes through [`WorkflowContext`]:
//! scheduling activities, timers and child workflows, recording side
//! effects, reading workflow time. The context turns each call into a
//! command with a deterministic id and hands back a [`WorkflowFuture`] that
//! the executor resolves once the matching history event is applied.
//!
//! Engine errors raised on behalf of workflow code (a command issued after
//! completion, a future resolved twice) do not surface here. They are kept
//! by the state manager and end the workflow task once control returns to
//! the executor.

use crate::error::{Result, WorkflowError};
use crate::workflow::dispatcher::{Dispatcher, Notification, NotificationKind};
use crate::workflow::failure::Failure;
use crate::workflow::future::{CancelFuture, ChildWorkflowFuture, WorkflowFuture};
use crate::workflow::metadata::WorkflowMetadata;
use crate::workflow::options::{ActivityOptions, ChildWorkflowOptions, ContinueAsNewOptions};
use crate::workflow::query_registry::QueryRegistry;
use crate::workflow::stack_trace::{StackTraceTracker, Suspension};
use crate::workflow::state_manager::{StateManager, SIDE_EFFECT_MARKER};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, warn};
use weft_core::workflow::{ContinueAsNew, ScheduleActivity, SignalExternalWorkflow, StartChildWorkflow};
use weft_core::{ClientError, Command, EventTarget, TargetType};

type SignalHandler = Arc<dyn Fn(Value) + Send + Sync>;
type AnySignalHandler = Arc<dyn Fn(&str, Value) + Send + Sync>;

#[derive(Default)]
struct SignalRouter {
    named: HashMap<String, SignalHandler>,
    any: Option<AnySignalHandler>,
    buffered: Vec<(String, Value)>,
}

enum Route {
    Named(SignalHandler),
    Any(AnySignalHandler),
    Unhandled,
}

pub(crate) struct ContextInner {
    state: Arc<Mutex<StateManager>>,
    dispatcher: Arc<Dispatcher>,
    queries: Arc<QueryRegistry>,
    signals: Mutex<SignalRouter>,
    tracker: Option<StackTraceTracker>,
    metadata: WorkflowMetadata,
    completed: AtomicBool,
    this: Weak<ContextInner>,
}

/// Deterministic API available to workflow code.
///
/// Cheap to clone; every clone drives the same run.
#[derive(Clone)]
pub struct WorkflowContext {
    inner: Arc<ContextInner>,
}

impl WorkflowContext {
    pub(crate) fn new(
        state: Arc<Mutex<StateManager>>,
        dispatcher: Arc<Dispatcher>,
        queries: Arc<QueryRegistry>,
        metadata: WorkflowMetadata,
        tracker: Option<StackTraceTracker>,
    ) -> Self {
        let inner = Arc::new_cyclic(|this| ContextInner {
            state,
            dispatcher,
            queries,
            signals: Mutex::new(SignalRouter::default()),
            tracker,
            metadata,
            completed: AtomicBool::new(false),
            this: this.clone(),
        });

        let router = Arc::downgrade(&inner);
        inner.dispatcher.register_handler(
            EventTarget::workflow(),
            Some(NotificationKind::Signaled),
            move |notification| {
                if let (Some(inner), Notification::Signaled { name, input }) = (router.upgrade(), notification) {
                    inner.route_signal(name, input.clone());
                }
                Ok(())
            },
        );

        Self { inner }
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    // === Activities ===

    /// Schedule an activity and return its future
    pub fn schedule_activity(
        &self,
        activity_type: &str,
        input: Value,
        options: ActivityOptions,
    ) -> Result<WorkflowFuture> {
        if let Some(policy) = &options.retry_policy {
            policy.validate()?;
        }

        let metadata = &self.inner.metadata;
        let command = Command::ScheduleActivity(ScheduleActivity {
            activity_id: options.activity_id.unwrap_or_default(),
            activity_type: activity_type.to_string(),
            input,
            namespace: Some(options.namespace.unwrap_or_else(|| metadata.namespace.clone())),
            task_queue: options.task_queue.or_else(|| metadata.task_queue.clone()),
            retry_policy: options.retry_policy,
            timeouts: options.timeouts,
            headers: options.headers,
        });

        let future = self.inner.issue(command);
        self.inner.resolve_on_completion(&future);
        Ok(future)
    }

    /// Schedule an activity and wait for its result
    #[track_caller]
    pub fn execute_activity(
        &self,
        activity_type: &str,
        input: Value,
        options: ActivityOptions,
    ) -> impl Future<Output = Result<Value>> + Send + 'static {
        let get = match self.schedule_activity(activity_type, input, options) {
            Ok(future) => Ok(future.get()),
            Err(e) => Err(e),
        };
        async move { get?.await.into_result().map_err(WorkflowError::from) }
    }

    /// Request cancellation of a scheduled activity.
    ///
    /// The activity's future fails once the cancellation is recorded.
    pub fn cancel_activity(&self, activity: &WorkflowFuture) -> std::result::Result<bool, ClientError> {
        if activity.target().target_type() != TargetType::Activity {
            return Err(ClientError::InvalidCancellation(activity.target()));
        }
        activity.cancel()
    }

    // === Timers ===

    pub fn start_timer(&self, timeout: Duration) -> WorkflowFuture {
        let future = self.inner.issue(Command::StartTimer {
            timer_id: String::new(),
            timeout,
        });
        self.inner.resolve_on_completion(&future);
        future
    }

    /// Wait for a durable timer
    #[track_caller]
    pub fn sleep(&self, duration: Duration) -> impl Future<Output = Result<()>> + Send + 'static {
        let get = self.start_timer(duration).get();
        async move {
            get.await.into_result()?;
            Ok(())
        }
    }

    /// Cancel a timer; its future fails right away
    pub fn cancel_timer(&self, timer: &WorkflowFuture) -> std::result::Result<bool, ClientError> {
        if timer.target().target_type() != TargetType::Timer {
            return Err(ClientError::InvalidCancellation(timer.target()));
        }
        timer.cancel()
    }

    // === Child workflows ===

    pub fn start_child_workflow(
        &self,
        workflow_type: &str,
        input: Value,
        options: ChildWorkflowOptions,
    ) -> Result<ChildWorkflowFuture> {
        if let Some(policy) = &options.retry_policy {
            policy.validate()?;
        }

        let metadata = &self.inner.metadata;
        let command = Command::StartChildWorkflow(StartChildWorkflow {
            workflow_id: options.workflow_id.unwrap_or_default(),
            workflow_type: workflow_type.to_string(),
            input,
            namespace: Some(options.namespace.unwrap_or_else(|| metadata.namespace.clone())),
            task_queue: options.task_queue.or_else(|| metadata.task_queue.clone()),
            retry_policy: options.retry_policy,
            parent_close_policy: options.parent_close_policy,
            timeouts: options.timeouts,
            headers: options.headers,
            cron_schedule: options.cron_schedule,
            memo: options.memo,
            workflow_id_reuse_policy: options.workflow_id_reuse_policy,
            search_attributes: options.search_attributes,
        });

        let child = ChildWorkflowFuture::new(self.inner.issue(command));
        self.inner.resolve_child(&child);
        Ok(child)
    }

    /// Start a child workflow and wait for its result
    #[track_caller]
    pub fn execute_child_workflow(
        &self,
        workflow_type: &str,
        input: Value,
        options: ChildWorkflowOptions,
    ) -> impl Future<Output = Result<Value>> + Send + 'static {
        let get = match self.start_child_workflow(workflow_type, input, options) {
            Ok(child) => Ok(child.get()),
            Err(e) => Err(e),
        };
        async move { get?.await.into_result().map_err(WorkflowError::from) }
    }

    // === Markers ===

    /// Run `f` once and record its result; replays return the recorded value
    pub fn side_effect<T, F>(&self, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let recorded = {
            let mut state = self.inner.state.lock();
            if state.is_replaying() {
                state.next_side_effect()
            } else {
                None
            }
        };
        if let Some(value) = recorded {
            return Ok(serde_json::from_value(value)?);
        }

        let value = f();
        self.inner.issue(Command::RecordMarker {
            name: SIDE_EFFECT_MARKER.to_string(),
            details: json!({ "data": serde_json::to_value(&value)? }),
        });
        Ok(value)
    }

    /// Whether the named release applies to this run.
    ///
    /// Live runs turn a release on and record it; replays only see releases
    /// their history recorded.
    pub fn has_release(&self, name: &str) -> bool {
        let mut state = self.inner.state.lock();
        match state.release(name) {
            Ok(released) => released,
            Err(e) => {
                state.record_fatal(e);
                false
            }
        }
    }

    // === External workflows and search attributes ===

    pub fn signal_external_workflow(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
        signal_name: &str,
        input: Value,
    ) -> Result<WorkflowFuture> {
        let command = Command::SignalExternalWorkflow(SignalExternalWorkflow {
            namespace: Some(self.inner.metadata.namespace.clone()),
            workflow_id: workflow_id.to_string(),
            run_id: run_id.map(str::to_string),
            signal_name: signal_name.to_string(),
            input,
            child_workflow_only: false,
        });

        let future = self.inner.issue(command);
        self.inner.resolve_on_completion(&future);
        Ok(future)
    }

    /// Merge search attributes into the run's visible attributes
    pub fn upsert_search_attributes(&self, search_attributes: Map<String, Value>) -> Result<()> {
        if search_attributes.is_empty() {
            return Err(ClientError::EmptySearchAttributes.into());
        }
        self.inner
            .issue(Command::UpsertSearchAttributes { search_attributes });
        Ok(())
    }

    pub fn search_attributes(&self) -> Map<String, Value> {
        self.inner.state.lock().search_attributes().clone()
    }

    // === Completion ===

    pub fn complete(&self, result: Value) {
        self.inner.finish(Command::CompleteWorkflow { result });
    }

    pub fn fail(&self, error: &WorkflowError) {
        warn!(error = %error, error_type = error.error_type(), "Workflow failed");
        self.inner.finish(Command::FailWorkflow {
            failure: error.to_failure_info(),
        });
    }

    /// Close this run and start a fresh one with `input`
    pub fn continue_as_new(&self, input: Value, options: ContinueAsNewOptions) -> Result<()> {
        if let Some(policy) = &options.retry_policy {
            policy.validate()?;
        }

        let metadata = &self.inner.metadata;
        self.inner.finish(Command::ContinueAsNew(ContinueAsNew {
            workflow_type: options
                .workflow_type
                .unwrap_or_else(|| metadata.workflow_type.clone()),
            task_queue: options.task_queue.or_else(|| metadata.task_queue.clone()),
            input,
            timeouts: options.timeouts,
            retry_policy: options.retry_policy,
            headers: options.headers,
            memo: options.memo,
            search_attributes: options.search_attributes,
        }));
        Ok(())
    }

    // === Waiting ===

    /// Wait until every future is resolved
    #[track_caller]
    pub fn wait_for_all(&self, futures: &[&WorkflowFuture]) -> impl Future<Output = ()> + Send + 'static {
        let futures: Vec<WorkflowFuture> = futures.iter().map(|f| (*f).clone()).collect();
        let waiting_on = describe(&futures);
        WaitUntil::new(
            self.inner.tracker.clone(),
            Location::caller(),
            waiting_on,
            move || futures.iter().all(WorkflowFuture::is_finished),
        )
    }

    /// Wait until one future is resolved, yielding its index.
    ///
    /// `None` when no futures are given.
    #[track_caller]
    pub fn wait_for_any(
        &self,
        futures: &[&WorkflowFuture],
    ) -> impl Future<Output = Option<usize>> + Send + 'static {
        let futures: Vec<WorkflowFuture> = futures.iter().map(|f| (*f).clone()).collect();
        let polled = futures.clone();
        let waiting_on = format!("any of {}", describe(&futures));
        WaitUntil::new(
            self.inner.tracker.clone(),
            Location::caller(),
            waiting_on,
            move || polled.is_empty() || polled.iter().any(WorkflowFuture::is_finished),
        )
        .map(move |()| futures.iter().position(WorkflowFuture::is_finished))
    }

    /// Wait until `condition` holds; it is checked after every history event
    #[track_caller]
    pub fn wait_until<F>(&self, condition: F) -> impl Future<Output = ()> + Send + 'static
    where
        F: FnMut() -> bool + Send + 'static,
    {
        WaitUntil::new(
            self.inner.tracker.clone(),
            Location::caller(),
            "condition",
            condition,
        )
    }

    // === Run information ===

    /// Workflow time: the start time of the current workflow task
    pub fn now(&self) -> DateTime<Utc> {
        self.inner
            .state
            .lock()
            .local_time()
            .or(self.inner.metadata.started_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn is_replaying(&self) -> bool {
        self.inner.state.lock().is_replaying()
    }

    pub fn metadata(&self) -> &WorkflowMetadata {
        &self.inner.metadata
    }

    pub fn history_size_bytes(&self) -> u64 {
        self.inner.state.lock().history_size_bytes()
    }

    /// Whether the server suggests continuing as new
    pub fn suggest_continue_as_new(&self) -> bool {
        self.inner.state.lock().suggest_continue_as_new()
    }

    // === Handlers ===

    /// Handle signals with the given name.
    ///
    /// Buffered signals of that name are delivered right away, in arrival order.
    pub fn on_signal<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let name = name.into();
        let handler: SignalHandler = Arc::new(handler);
        let pending: Vec<Value> = {
            let mut signals = self.inner.signals.lock();
            signals.named.insert(name.clone(), Arc::clone(&handler));
            let (matching, rest) = std::mem::take(&mut signals.buffered)
                .into_iter()
                .partition(|(signal, _)| *signal == name);
            signals.buffered = rest;
            matching.into_iter().map(|(_, input)| input).collect()
        };

        for input in pending {
            handler(input);
        }
    }

    /// Handle every signal that has no named handler
    pub fn on_any_signal<F>(&self, handler: F)
    where
        F: Fn(&str, Value) + Send + Sync + 'static,
    {
        let handler: AnySignalHandler = Arc::new(handler);
        let pending = {
            let mut signals = self.inner.signals.lock();
            signals.any = Some(Arc::clone(&handler));
            std::mem::take(&mut signals.buffered)
        };

        for (name, input) in pending {
            handler(&name, input);
        }
    }

    pub fn on_query<F>(&self, query_type: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.inner.queries.register(query_type, handler);
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("workflow_type", &self.inner.metadata.workflow_type)
            .field("workflow_id", &self.inner.metadata.workflow_id)
            .field("run_id", &self.inner.metadata.run_id)
            .finish()
    }
}

impl ContextInner {
    /// Queue a command and attach a future to its target
    fn issue(&self, command: Command) -> WorkflowFuture {
        let target_type = command.target_type();
        let scheduled = {
            let mut state = self.state.lock();
            state.schedule(command).map_err(|e| state.record_fatal(e))
        };

        match scheduled {
            Ok(scheduled) => {
                let canceler: Weak<dyn CancelFuture> = self.this.clone();
                WorkflowFuture::attached(
                    scheduled.target,
                    scheduled.cancelation_id,
                    canceler,
                    self.tracker.clone(),
                )
            }
            // The task ends at the next poll; this future is never resolved
            Err(()) => WorkflowFuture::new(EventTarget::new(0, target_type)),
        }
    }

    fn finish(&self, command: Command) {
        self.issue(command);
        self.completed.store(true, Ordering::SeqCst);
    }

    fn resolve_on_completion(&self, future: &WorkflowFuture) {
        let future = future.clone();
        self.dispatcher
            .register_handler(future.target(), None, move |notification| match notification {
                Notification::Completed(value) => future.set(value.clone()),
                Notification::Fired => future.set(Value::Null),
                Notification::Failed(failure) => future.fail(failure.clone()),
                _ => Ok(()),
            });
    }

    fn resolve_child(&self, child: &ChildWorkflowFuture) {
        let child = child.clone();
        self.dispatcher
            .register_handler(child.result().target(), None, move |notification| match notification {
                Notification::Started(execution) => child.execution().set(execution.clone()),
                Notification::Completed(value) => child.result().set(value.clone()),
                Notification::Failed(failure) => {
                    if !child.execution().is_finished() {
                        child.execution().fail(failure.clone())?;
                    }
                    child.result().fail(failure.clone())
                }
                _ => Ok(()),
            });
    }

    fn route_signal(&self, name: &str, input: Value) {
        let route = {
            let signals = self.signals.lock();
            match (signals.named.get(name), &signals.any) {
                (Some(handler), _) => Route::Named(Arc::clone(handler)),
                (None, Some(handler)) => Route::Any(Arc::clone(handler)),
                (None, None) => Route::Unhandled,
            }
        };

        match route {
            Route::Named(handler) => handler(input),
            Route::Any(handler) => handler(name, input),
            Route::Unhandled => {
                if self.state.lock().saves_unhandled_signals() {
                    debug!(signal = name, "Buffering signal until a handler is registered");
                    self.signals.lock().buffered.push((name.to_string(), input));
                } else {
                    warn!(signal = name, "Signal received without a handler, dropping it");
                }
            }
        }
    }
}

impl CancelFuture for ContextInner {
    fn cancel_future(&self, future: &WorkflowFuture) -> std::result::Result<(), ClientError> {
        let target = future.target();
        match target.target_type() {
            TargetType::Activity => {
                self.issue(Command::RequestActivityCancellation {
                    activity_id: target.id().to_string(),
                });
                Ok(())
            }
            TargetType::Timer => {
                let timer_id = future
                    .cancelation_id()
                    .map(str::to_string)
                    .unwrap_or_else(|| target.id().to_string());
                self.issue(Command::CancelTimer { timer_id });
                if let Err(e) = future.fail(Failure::Canceled { details: Value::Null }) {
                    self.state.lock().record_fatal(e);
                }
                Ok(())
            }
            _ => Err(ClientError::InvalidCancellation(target)),
        }
    }
}

fn describe(futures: &[WorkflowFuture]) -> String {
    let targets: Vec<String> = futures.iter().map(|f| f.target().to_string()).collect();
    format!("[{}]", targets.join(", "))
}

/// Future that is ready once a condition holds
struct WaitUntil {
    condition: Box<dyn FnMut() -> bool + Send>,
    suspension: Suspension,
}

impl WaitUntil {
    fn new(
        tracker: Option<StackTraceTracker>,
        location: &'static Location<'static>,
        waiting_on: impl Into<String>,
        condition: impl FnMut() -> bool + Send + 'static,
    ) -> Self {
        Self {
            condition: Box::new(condition),
            suspension: Suspension::new(tracker, location, waiting_on),
        }
    }
}

impl Future for WaitUntil {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if (self.condition)() {
            self.suspension.resume();
            Poll::Ready(())
        } else {
            self.suspension.suspend();
            Poll::Pending
        }
    }
}
