//! Unit tests driving workflows through built histories

mod context_tests;
mod processor_tests;
mod props;

use std::sync::Arc;
use weft_sdk::testing::HistoryBuilder;
use weft_sdk::{
    ErrorRegistry, ExecutorConfig, History, RunResult, WorkflowExecutor, WorkflowMetadata,
    WorkflowRegistry,
};

static TRACING_INITIALIZED: std::sync::Once = std::sync::Once::new();

pub fn init_tracing() {
    TRACING_INITIALIZED.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_test_writer()
            .init();
    });
}

/// Executor for the workflow type recorded in `history`
pub fn executor(
    registry: &WorkflowRegistry,
    workflow_type: &str,
    history: History,
    config: ExecutorConfig,
) -> WorkflowExecutor {
    init_tracing();
    WorkflowExecutor::new(
        registry.resolve(workflow_type).unwrap(),
        history,
        WorkflowMetadata::new(workflow_type, "wf-1", "run-1"),
        config,
        Arc::new(ErrorRegistry::new()),
    )
    .unwrap()
}

/// Replay `history` with the default configuration
pub fn run(registry: &WorkflowRegistry, workflow_type: &str, history: History) -> RunResult {
    executor(registry, workflow_type, history, ExecutorConfig::DEFAULT)
        .run()
        .unwrap()
}

/// First workflow task of a fresh run, not yet completed
pub fn first_task(workflow_type: &str) -> HistoryBuilder {
    HistoryBuilder::started(workflow_type, serde_json::Value::Null).workflow_task_started()
}
