//! Compensating transactions for workflow code.
//!
//! A saga collects one compensation per completed forward step. When the
//! forward block fails, the compensations run in reverse order of
//! registration. The first compensation that fails stops the rollback and
//! its error is returned to the caller.

use crate::error::{Result, WorkflowError};
use crate::workflow::context::WorkflowContext;
use crate::workflow::options::ActivityOptions;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

type CompensationFn = Box<dyn FnOnce(WorkflowContext) -> BoxFuture<'static, Result<()>> + Send>;

enum Compensation {
    Activity {
        activity_type: String,
        input: Value,
        options: ActivityOptions,
    },
    Fn(CompensationFn),
}

/// Outcome of [`run_saga`]
#[derive(Debug)]
pub struct SagaResult {
    /// The forward block finished without error
    pub completed: bool,
    /// Error that triggered the rollback
    pub rollback_reason: Option<WorkflowError>,
}

impl SagaResult {
    pub fn is_compensated(&self) -> bool {
        !self.completed
    }
}

/// Ordered compensations of a running saga
#[derive(Clone)]
pub struct Saga {
    ctx: WorkflowContext,
    compensations: Arc<Mutex<Vec<Compensation>>>,
}

impl Saga {
    fn new(ctx: WorkflowContext) -> Self {
        Self {
            ctx,
            compensations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Compensate with an activity
    pub fn add_compensation(&self, activity_type: impl Into<String>, input: Value) {
        self.add_compensation_with(activity_type, input, ActivityOptions::default());
    }

    pub fn add_compensation_with(&self, activity_type: impl Into<String>, input: Value, options: ActivityOptions) {
        self.compensations.lock().push(Compensation::Activity {
            activity_type: activity_type.into(),
            input,
            options,
        });
    }

    /// Compensate with arbitrary workflow code
    pub fn add_compensation_fn<F, Fut>(&self, compensation: F)
    where
        F: FnOnce(WorkflowContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let compensation: CompensationFn = Box::new(move |ctx| compensation(ctx).boxed());
        self.compensations.lock().push(Compensation::Fn(compensation));
    }

    pub fn len(&self) -> usize {
        self.compensations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every compensation, newest first, stopping at the first failure
    pub async fn compensate(&self) -> Result<()> {
        let compensations = std::mem::take(&mut *self.compensations.lock());

        for compensation in compensations.into_iter().rev() {
            match compensation {
                Compensation::Activity {
                    activity_type,
                    input,
                    options,
                } => {
                    debug!(activity_type = %activity_type, "Running compensation");
                    self.ctx.execute_activity(&activity_type, input, options).await?;
                }
                Compensation::Fn(compensation) => compensation(self.ctx.clone()).await?,
            }
        }
        Ok(())
    }
}

/// Run `block` as a saga.
///
/// Returns a completed result when the block succeeds. When it fails, the
/// registered compensations run and the block's error is reported as the
/// rollback reason. A failing compensation is returned as `Err`.
pub async fn run_saga<F, Fut>(ctx: &WorkflowContext, block: F) -> Result<SagaResult>
where
    F: FnOnce(Saga) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let saga = Saga::new(ctx.clone());

    match block(saga.clone()).await {
        Ok(()) => Ok(SagaResult {
            completed: true,
            rollback_reason: None,
        }),
        Err(e) => {
            error!(error = %e, "Saga execution aborted");
            saga.compensate().await?;
            Ok(SagaResult {
                completed: false,
                rollback_reason: Some(e),
            })
        }
    }
}
