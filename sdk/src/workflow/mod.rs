//! Workflow runtime: futures, context and replay state

pub mod context;
pub mod definition;
pub mod dispatcher;
pub mod failure;
pub mod future;
pub mod metadata;
pub mod options;
pub mod query_registry;
pub mod saga;
pub mod stack_trace;
pub(crate) mod state_manager;

pub use context::WorkflowContext;
pub use definition::{generate_schema, DynamicWorkflow, WorkflowDefinition};
pub use dispatcher::{Dispatcher, Notification, NotificationKind};
pub use failure::{ApplicationFailure, ErrorRegistry, Failure};
pub use future::{ChildWorkflowFuture, FutureState, Outcome, WorkflowFuture};
pub use metadata::WorkflowMetadata;
pub use options::{ActivityOptions, ChildWorkflowOptions, ContinueAsNewOptions};
pub use query_registry::{QueryError, QueryRegistry};
pub use saga::{run_saga, Saga, SagaResult};
pub use stack_trace::{StackTraceTracker, STACK_TRACE_QUERY_NAME};
