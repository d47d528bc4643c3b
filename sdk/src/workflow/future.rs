//! Single-assignment futures for workflow operations.
//!
//! A [`WorkflowFuture`] is created when workflow code issues an operation and
//! is resolved exactly once by the executor when the matching history event
//! is applied. Awaiting it is the only way workflow code suspends.
//!
//! The executor polls workflow code after every applied event, so these
//! futures never register wakers: a pending poll simply reports where the
//! workflow is suspended.

use crate::workflow::failure::Failure;
use crate::workflow::stack_trace::{StackTraceTracker, Suspension};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use weft_core::{ClientError, EventTarget, InternalError};

/// Lifecycle of a future; it leaves `Pending` exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Fulfilled,
    Failed,
}

impl FutureState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Failed => "failed",
        }
    }
}

/// What a resolved future holds.
///
/// A failed future yields its failure as a value; callers that want failures
/// as errors use [`Outcome::into_result`] or the `execute_*` wrappers.
#[derive(Debug, Clone)]
pub enum Outcome {
    Value(Value),
    Error(Failure),
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Error(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Value(_) => None,
            Self::Error(f) => Some(f),
        }
    }

    pub fn into_result(self) -> Result<Value, Failure> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Error(f) => Err(f),
        }
    }

    /// Deserialize the value into a typed result
    pub fn into_typed<T: DeserializeOwned>(self) -> crate::error::Result<T> {
        Ok(serde_json::from_value(self.into_result()?)?)
    }
}

type DoneCallback = Box<dyn FnOnce(&Value) + Send>;
type FailedCallback = Box<dyn FnOnce(&Failure) + Send>;

struct Cell {
    state: FutureState,
    result: Value,
    failure: Option<Failure>,
    on_done: Vec<DoneCallback>,
    on_failed: Vec<FailedCallback>,
}

impl Cell {
    fn outcome(&self) -> Option<Outcome> {
        match (self.state, &self.failure) {
            (FutureState::Pending, _) => None,
            (FutureState::Failed, Some(failure)) => Some(Outcome::Error(failure.clone())),
            _ => Some(Outcome::Value(self.result.clone())),
        }
    }
}

/// Context side of [`WorkflowFuture::cancel`]
pub(crate) trait CancelFuture: Send + Sync {
    fn cancel_future(&self, future: &WorkflowFuture) -> Result<(), ClientError>;
}

/// Single-assignment result of a workflow operation
#[derive(Clone)]
pub struct WorkflowFuture {
    target: EventTarget,
    cancelation_id: Option<String>,
    cell: Arc<Mutex<Cell>>,
    canceler: Option<Weak<dyn CancelFuture>>,
    tracker: Option<StackTraceTracker>,
}

impl WorkflowFuture {
    /// A pending future correlated with `target`
    pub fn new(target: EventTarget) -> Self {
        Self {
            target,
            cancelation_id: None,
            cell: Arc::new(Mutex::new(Cell {
                state: FutureState::Pending,
                result: Value::Null,
                failure: None,
                on_done: Vec::new(),
                on_failed: Vec::new(),
            })),
            canceler: None,
            tracker: None,
        }
    }

    pub(crate) fn attached(
        target: EventTarget,
        cancelation_id: Option<String>,
        canceler: Weak<dyn CancelFuture>,
        tracker: Option<StackTraceTracker>,
    ) -> Self {
        Self {
            cancelation_id,
            canceler: Some(canceler),
            tracker,
            ..Self::new(target)
        }
    }

    pub fn target(&self) -> EventTarget {
        self.target
    }

    /// Id used to address the operation when canceling it
    pub fn cancelation_id(&self) -> Option<&str> {
        self.cancelation_id.as_deref()
    }

    pub fn state(&self) -> FutureState {
        self.cell.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state() != FutureState::Pending
    }

    pub fn is_ready(&self) -> bool {
        self.state() == FutureState::Fulfilled
    }

    pub fn is_failed(&self) -> bool {
        self.state() == FutureState::Failed
    }

    /// The outcome, if the future is resolved
    pub fn outcome(&self) -> Option<Outcome> {
        self.cell.lock().outcome()
    }

    /// Fulfil the future and run its done callbacks
    pub fn set(&self, value: Value) -> Result<(), InternalError> {
        let callbacks = {
            let mut cell = self.cell.lock();
            self.ensure_pending(&cell, "fulfil")?;
            cell.state = FutureState::Fulfilled;
            cell.result = value.clone();
            cell.on_failed.clear();
            std::mem::take(&mut cell.on_done)
        };

        for callback in callbacks {
            callback(&value);
        }
        Ok(())
    }

    /// Fail the future and run its failed callbacks
    pub fn fail(&self, failure: Failure) -> Result<(), InternalError> {
        let callbacks = {
            let mut cell = self.cell.lock();
            self.ensure_pending(&cell, "fail")?;
            cell.state = FutureState::Failed;
            cell.failure = Some(failure.clone());
            cell.on_done.clear();
            std::mem::take(&mut cell.on_failed)
        };

        for callback in callbacks {
            callback(&failure);
        }
        Ok(())
    }

    fn ensure_pending(&self, cell: &Cell, action: &'static str) -> Result<(), InternalError> {
        if cell.state == FutureState::Pending {
            return Ok(());
        }
        Err(InternalError::FutureAlreadyResolved {
            target: self.target.to_string(),
            action,
            state: cell.state.as_str(),
        })
    }

    /// Run `callback` once the future is fulfilled; immediately if it already is
    pub fn done<F>(&self, callback: F)
    where
        F: FnOnce(&Value) + Send + 'static,
    {
        let mut cell = self.cell.lock();
        match cell.state {
            FutureState::Pending => cell.on_done.push(Box::new(callback)),
            FutureState::Fulfilled => {
                let value = cell.result.clone();
                drop(cell);
                callback(&value);
            }
            FutureState::Failed => {}
        }
    }

    /// Run `callback` once the future fails; immediately if it already has
    pub fn failed<F>(&self, callback: F)
    where
        F: FnOnce(&Failure) + Send + 'static,
    {
        let mut cell = self.cell.lock();
        match (cell.state, cell.failure.clone()) {
            (FutureState::Pending, _) => cell.on_failed.push(Box::new(callback)),
            (FutureState::Failed, Some(failure)) => {
                drop(cell);
                callback(&failure);
            }
            _ => {}
        }
    }

    /// Suspend until resolved, yielding the value or the failure itself
    #[track_caller]
    pub fn get(&self) -> Get {
        Get {
            future: self.clone(),
            suspension: Suspension::new(self.tracker.clone(), Location::caller(), self.target.to_string()),
        }
    }

    /// Suspend until resolved
    #[track_caller]
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        self.get().map(|_| ())
    }

    /// Request cancellation of the operation.
    ///
    /// Returns `Ok(false)` when the future is already resolved. Only
    /// activities and timers can be canceled.
    pub fn cancel(&self) -> Result<bool, ClientError> {
        if self.is_finished() {
            return Ok(false);
        }

        let canceler = self
            .canceler
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(ClientError::InvalidCancellation(self.target))?;
        canceler.cancel_future(self)?;
        Ok(true)
    }
}

impl fmt::Debug for WorkflowFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowFuture")
            .field("target", &self.target)
            .field("cancelation_id", &self.cancelation_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Future returned by [`WorkflowFuture::get`]
pub struct Get {
    future: WorkflowFuture,
    suspension: Suspension,
}

impl Future for Get {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.future.outcome() {
            Some(outcome) => {
                self.suspension.resume();
                Poll::Ready(outcome)
            }
            None => {
                self.suspension.suspend();
                Poll::Pending
            }
        }
    }
}

// ============================================================================
// ChildWorkflowFuture
// ============================================================================

/// Future for a child workflow.
///
/// Besides the child's result it tracks the child's start, which resolves
/// with the child's execution (`workflowId`/`runId`) once the server started
/// it.
#[derive(Debug, Clone)]
pub struct ChildWorkflowFuture {
    result: WorkflowFuture,
    execution: WorkflowFuture,
}

impl ChildWorkflowFuture {
    pub(crate) fn new(result: WorkflowFuture) -> Self {
        let execution = WorkflowFuture::new(result.target());
        Self { result, execution }
    }

    /// Resolves with the child's result
    pub fn result(&self) -> &WorkflowFuture {
        &self.result
    }

    /// Resolves once the child has started
    pub fn execution(&self) -> &WorkflowFuture {
        &self.execution
    }

    #[track_caller]
    pub fn get(&self) -> Get {
        self.result.get()
    }

    #[track_caller]
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        self.result.wait()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_finished()
    }
}
