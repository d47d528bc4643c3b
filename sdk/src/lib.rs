//! weft SDK for Rust
//!
//! This SDK replays workflow code deterministically against its recorded
//! history: it drives workflow coroutines event by event, checks the commands
//! they issue against history, and collects the new commands a workflow task
//! responds with.

#![allow(clippy::result_large_err)]

pub mod config;
pub mod error;
pub mod worker;
pub mod workflow;

/// Testing utilities for replaying recorded histories.
/// Available only with the `testing` feature enabled.
#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used types
pub use error::{Result, WorkflowError};

// Re-export config types
pub use config::{ConfigError, ExecutorConfig, WorkerConfig};

// Re-export workflow types
pub use workflow::{
    run_saga, ActivityOptions, ApplicationFailure, ChildWorkflowFuture, ChildWorkflowOptions,
    ContinueAsNewOptions, DynamicWorkflow, ErrorRegistry, Failure, FutureState, Outcome, Saga,
    SagaResult, WorkflowContext, WorkflowDefinition, WorkflowFuture, WorkflowMetadata,
};

// Re-export worker types
pub use worker::{
    QueryResult, RegisteredWorkflow, RunResult, WorkflowExecutor, WorkflowInfo, WorkflowQuery,
    WorkflowRegistry, WorkflowTask, WorkflowTaskProcessor, WorkflowTaskResult,
};

// Re-export the core model
pub use weft_core::{
    ClientError, Command, CoreError, EventTarget, EventType, History, HistoryEvent,
    InternalError, NonDeterminismError, RetryPolicy, SdkFlag, TargetType,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ExecutorConfig, WorkerConfig};
    pub use crate::error::{Result, WorkflowError};
    pub use crate::worker::{WorkflowRegistry, WorkflowTask, WorkflowTaskProcessor, WorkflowTaskResult};
    pub use crate::workflow::{
        run_saga, ActivityOptions, ChildWorkflowOptions, ContinueAsNewOptions, DynamicWorkflow,
        Failure, Saga, SagaResult, WorkflowContext, WorkflowDefinition, WorkflowFuture,
    };
    pub use async_trait::async_trait;
    pub use schemars::JsonSchema;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Map, Value};
    pub use weft_core::RetryPolicy;
}
