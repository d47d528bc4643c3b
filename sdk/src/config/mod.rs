//! Configuration presets for workflow execution
//!
//! This module provides the knobs of the replay engine with sensible
//! defaults and presets for common use cases.

/// Configuration for the workflow executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Deliver signals before other events of a workflow task on new runs
    pub handle_signals_first: bool,
    /// Buffer signals that arrive before their handler is registered
    pub save_first_task_signals: bool,
    /// Maximum number of new commands a single workflow task may issue
    pub max_commands_per_task: usize,
    /// Evaluate the stack trace query when a workflow task fails
    pub capture_stack_trace: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ExecutorConfig {
    /// Default configuration suitable for most use cases
    pub const DEFAULT: Self = Self {
        handle_signals_first: true,
        save_first_task_signals: true,
        max_commands_per_task: 1000,
        capture_stack_trace: true,
    };

    /// Signal ordering of runs started before signal-first handling existed
    pub const LEGACY: Self = Self {
        handle_signals_first: false,
        save_first_task_signals: false,
        max_commands_per_task: 1000,
        capture_stack_trace: true,
    };

    /// Tight command budget, for catching runaway workflows in tests
    pub const STRICT: Self = Self {
        handle_signals_first: true,
        save_first_task_signals: true,
        max_commands_per_task: 100,
        capture_stack_trace: true,
    };

    /// Create a new configuration with validation
    pub fn new(
        handle_signals_first: bool,
        save_first_task_signals: bool,
        max_commands_per_task: usize,
        capture_stack_trace: bool,
    ) -> Result<Self, ConfigError> {
        if max_commands_per_task == 0 {
            return Err(ConfigError::InvalidValue(
                "max_commands_per_task must be positive".to_string(),
            ));
        }

        Ok(Self {
            handle_signals_first,
            save_first_task_signals,
            max_commands_per_task,
            capture_stack_trace,
        })
    }
}

/// Complete configuration for a workflow task processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Configuration for the executor
    pub executor: ExecutorConfig,
    /// Namespace used by commands that don't name one
    pub namespace: String,
    /// Task queue used by commands that don't name one
    pub task_queue: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::DEFAULT,
            namespace: "default".to_string(),
            task_queue: None,
        }
    }
}

impl WorkerConfig {
    /// Set executor configuration
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    /// Set the default namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the default task queue
    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
