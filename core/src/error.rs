//! Core error types for the weft replay engine
//!
//! These errors are shared by every layer built on the core model. SDK-level
//! errors wrap or extend them.

use crate::workflow::EventTarget;

/// Core error type for history handling and engine operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary history could not be decoded
    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// History is structurally invalid
    #[error("Invalid history: {0}")]
    InvalidHistory(String),

    /// Command cannot be expressed on the wire
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Engine invariant violated
    #[error(transparent)]
    Internal(#[from] InternalError),

    /// Caller misuse
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Result type alias for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Engine invariant violations.
///
/// These are fatal to the workflow task that hit them. They point at an
/// engine bug or at workflow code that is not deterministic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    #[error(transparent)]
    NonDeterministicWorkflow(#[from] NonDeterminismError),

    #[error("Unknown SDK flags: {0}")]
    UnknownSdkFlag(String),

    #[error("{0}")]
    WorkflowAlreadyCompleting(String),

    #[error("Unexpected event {0}")]
    UnexpectedEventType(String),

    #[error("Unsupported event {0}")]
    UnsupportedEvent(String),

    #[error("Unsupported marker type {0}")]
    UnsupportedMarkerType(String),

    #[error("Workflow task issued {count} commands, more than the limit of {limit}")]
    TooManyCommands { count: usize, limit: usize },

    /// A future was resolved a second time
    #[error("can not {action} a {state} future: {target}")]
    FutureAlreadyResolved {
        target: String,
        action: &'static str,
        state: &'static str,
    },
}

/// Caller misuse, detected at configuration or call time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Retry policy failed validation
    #[error("{0}")]
    InvalidRetryPolicy(String),

    #[error("Cannot upsert an empty map for search_attributes, as this would do nothing.")]
    EmptySearchAttributes,

    #[error("Workflow '{0}' is not registered")]
    WorkflowNotRegistered(String),

    #[error("Workflow '{0}' is already registered. Each workflow type must be unique within a registry.")]
    WorkflowAlreadyRegistered(String),

    #[error("{0} can not be canceled")]
    InvalidCancellation(EventTarget),
}

const NON_DETERMINISM_SUFFIX: &str = "Likely, either you have made a version-unsafe change to your workflow or have non-deterministic behavior in your workflow.";

/// Divergence between the commands a replay issues and recorded history.
///
/// The messages name both sides of the divergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonDeterminismError {
    /// Replay issued a command that does not match the next recorded one
    UnexpectedCommand {
        replay_target: EventTarget,
        history_target: EventTarget,
    },

    /// History recorded a command that replay never issued
    MissingCommand { history_target: EventTarget },
}

impl std::fmt::Display for NonDeterminismError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedCommand {
                replay_target,
                history_target,
            } => write!(
                f,
                "Unexpected command. The replaying code is issuing: {}, but the history of previous executions recorded: {}. {}",
                replay_target, history_target, NON_DETERMINISM_SUFFIX
            ),
            Self::MissingCommand { history_target } => write!(
                f,
                "A command in the history of previous executions, {}, was not scheduled upon replay. {}",
                history_target, NON_DETERMINISM_SUFFIX
            ),
        }
    }
}

impl std::error::Error for NonDeterminismError {}
