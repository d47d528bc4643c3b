//! Error types for the weft SDK

pub use weft_core::{ClientError, CoreError, InternalError, NonDeterminismError};

use crate::workflow::failure::Failure;
use serde_json::Value;
use weft_core::workflow::payload::encode_payloads;
use weft_core::workflow::{ApplicationFailureInfo, FailureInfo};

/// Error returned by workflow code.
///
/// Whatever a workflow returns as `Err` ends the run with a `FailWorkflow`
/// command built from [`WorkflowError::to_failure_info`].
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Failure of an awaited operation (activity, timer, child workflow)
    #[error(transparent)]
    Failed(#[from] Failure),

    /// Error raised by workflow code itself
    #[error("{message}")]
    Application {
        error_type: String,
        message: String,
        details: Option<Value>,
        non_retryable: bool,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller misuse, e.g. an invalid retry policy
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for workflow code
pub type Result<T> = std::result::Result<T, WorkflowError>;

impl WorkflowError {
    /// Application error with a type name used to look it up on the other side
    pub fn application(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            error_type: error_type.into(),
            message: message.into(),
            details: None,
            non_retryable: false,
        }
    }

    /// Application error that must not be retried
    pub fn non_retryable(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            error_type: error_type.into(),
            message: message.into(),
            details: None,
            non_retryable: true,
        }
    }

    /// Type name reported in the failure payload
    pub fn error_type(&self) -> &str {
        match self {
            Self::Failed(failure) => failure.type_name(),
            Self::Application { error_type, .. } => error_type,
            Self::Serialization(_) => "SerializationError",
            Self::Client(_) => "ClientError",
            Self::Other(_) => "WorkflowError",
        }
    }

    /// Structured failure payload for a `FailWorkflow` command
    pub fn to_failure_info(&self) -> FailureInfo {
        match self {
            Self::Application {
                error_type,
                message,
                details,
                non_retryable,
            } => FailureInfo {
                message: message.clone(),
                application_failure_info: Some(ApplicationFailureInfo {
                    error_type: error_type.clone(),
                    non_retryable: *non_retryable,
                    details: details
                        .as_ref()
                        .map(|d| encode_payloads(std::slice::from_ref(d))),
                }),
                ..FailureInfo::default()
            },
            Self::Failed(failure) => failure.to_failure_info(),
            other => FailureInfo::application(other.error_type(), other.to_string()),
        }
    }
}
