//! Workflow task processing: registry, executor and task processor

pub mod executor;
pub mod registry;
pub mod task_processor;

pub use executor::{QueryResult, RunResult, WorkflowExecutor, WorkflowQuery};
pub use registry::{RegisteredWorkflow, WorkflowInfo, WorkflowRegistry};
pub use task_processor::{WorkflowTask, WorkflowTaskProcessor, WorkflowTaskResult};
