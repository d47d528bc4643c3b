//! WorkflowRegistry - workflow types a worker can replay

use crate::error::{Result, WorkflowError};
use crate::workflow::context::WorkflowContext;
use crate::workflow::definition::WorkflowDefinition;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use weft_core::ClientError;

/// Description of a registered workflow type
#[derive(Debug, Clone)]
pub struct WorkflowInfo {
    pub kind: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
}

impl WorkflowInfo {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: None,
            input_schema: None,
            output_schema: None,
        }
    }
}

/// Entry point of a workflow, taking the raw start input
pub type BoxedWorkflowFn = Box<dyn Fn(WorkflowContext, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub struct RegisteredWorkflow {
    pub info: WorkflowInfo,
    start_fn: BoxedWorkflowFn,
}

impl RegisteredWorkflow {
    pub fn new(info: WorkflowInfo, start_fn: BoxedWorkflowFn) -> Self {
        Self { info, start_fn }
    }

    /// Create the workflow's coroutine; nothing runs until it is polled
    pub fn start(&self, ctx: WorkflowContext, input: Value) -> BoxFuture<'static, Result<Value>> {
        (self.start_fn)(ctx, input)
    }
}

impl std::fmt::Debug for RegisteredWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredWorkflow")
            .field("info", &self.info)
            .field("start_fn", &"<function>")
            .finish()
    }
}

/// Workflow implementations keyed by workflow type
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<RegisteredWorkflow>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_raw(&self, workflow: RegisteredWorkflow) -> std::result::Result<(), ClientError> {
        let kind = workflow.info.kind.clone();
        let mut workflows = self.workflows.write();

        if workflows.contains_key(&kind) {
            return Err(ClientError::WorkflowAlreadyRegistered(kind));
        }

        workflows.insert(kind, Arc::new(workflow));
        Ok(())
    }

    /// Register a workflow definition under its kind
    ///
    /// # Example
    ///
    /// ```ignore
    /// registry.register(OrderWorkflow)?;
    /// ```
    pub fn register<W>(&self, workflow: W) -> std::result::Result<(), ClientError>
    where
        W: WorkflowDefinition + 'static,
    {
        let info = WorkflowInfo {
            kind: workflow.kind().to_string(),
            description: workflow.description().map(str::to_string),
            input_schema: workflow.input_schema(),
            output_schema: workflow.output_schema(),
        };

        let workflow = Arc::new(workflow);
        let start_fn: BoxedWorkflowFn = Box::new(move |ctx, input| {
            let workflow = Arc::clone(&workflow);
            Box::pin(async move {
                let input: W::Input = serde_json::from_value(input).map_err(WorkflowError::Serialization)?;
                let output = workflow.execute(&ctx, input).await?;
                serde_json::to_value(output).map_err(WorkflowError::Serialization)
            })
        });

        self.register_raw(RegisteredWorkflow::new(info, start_fn))
    }

    /// Register a closure as a workflow
    pub fn register_fn<F, Fut>(&self, kind: &str, workflow_fn: F) -> std::result::Result<(), ClientError>
    where
        F: Fn(WorkflowContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let start_fn: BoxedWorkflowFn = Box::new(move |ctx, input| Box::pin(workflow_fn(ctx, input)));
        self.register_raw(RegisteredWorkflow::new(WorkflowInfo::new(kind), start_fn))
    }

    pub fn get(&self, kind: &str) -> Option<Arc<RegisteredWorkflow>> {
        self.workflows.read().get(kind).cloned()
    }

    /// Like [`get`](Self::get), failing for unknown kinds
    pub fn resolve(&self, kind: &str) -> std::result::Result<Arc<RegisteredWorkflow>, ClientError> {
        self.get(kind)
            .ok_or_else(|| ClientError::WorkflowNotRegistered(kind.to_string()))
    }

    pub fn has(&self, kind: &str) -> bool {
        self.workflows.read().contains_key(kind)
    }

    pub fn registered_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.workflows.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.workflows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.read().is_empty()
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &self.registered_kinds())
            .finish()
    }
}
