//! Failures delivered to workflow code.
//!
//! History carries failures as structured payloads naming an error type.
//! Turning a type name back into a Rust error goes through an explicit
//! [`ErrorRegistry`]: only registered names are decoded, anything else is
//! reported as [`Failure::UnregisteredErrorType`].

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::error;
use weft_core::workflow::payload::{collapse, decode_payloads, encode_payloads};
use weft_core::workflow::{ApplicationFailureInfo, CanceledFailureInfo, FailureInfo, TimeoutFailureInfo};

/// Decoded error object attached to an application failure
pub type DecodedError = Arc<dyn std::error::Error + Send + Sync>;

type Decoder = Arc<dyn Fn(&ApplicationFailure) -> Option<DecodedError> + Send + Sync>;

const START_CHILD_ALREADY_EXISTS: &str = "START_CHILD_WORKFLOW_EXECUTION_FAILED_CAUSE_WORKFLOW_ALREADY_EXISTS";

/// An application-level failure recorded in history
#[derive(Debug, Clone, Default)]
pub struct ApplicationFailure {
    pub error_type: String,
    pub message: String,
    pub details: Value,
    pub non_retryable: bool,
    pub stack_trace: Vec<String>,
    decoded: Option<DecodedError>,
}

impl ApplicationFailure {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// The decoded error object, if the type was registered
    pub fn decoded(&self) -> Option<&DecodedError> {
        self.decoded.as_ref()
    }

    /// Downcast the decoded error object to a concrete type
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.decoded.as_ref().and_then(|e| e.downcast_ref::<E>())
    }
}

/// Why an awaited operation failed
#[derive(Debug, Clone, thiserror::Error)]
pub enum Failure {
    #[error("{}", .0.message)]
    Application(ApplicationFailure),

    /// Application failure whose type name has no registered decoder
    #[error("Unregistered error type '{}': {}", .0.error_type, .0.message)]
    UnregisteredErrorType(ApplicationFailure),

    #[error("Timeout type: {timeout_type}")]
    Timeout { timeout_type: String },

    #[error("Canceled")]
    Canceled { details: Value },

    #[error("The child workflow was terminated")]
    ChildWorkflowTerminated,

    #[error("The child workflow timed out before succeeding")]
    ChildWorkflowTimeout,

    #[error("{}", start_child_message(.workflow_id, .cause))]
    StartChildFailed { workflow_id: String, cause: String },

    #[error("Signal to external workflow failed: {cause}")]
    ExternalSignalFailed { cause: String },

    #[error("{message}")]
    Other { message: String },
}

fn start_child_message(workflow_id: &str, cause: &str) -> String {
    if cause == START_CHILD_ALREADY_EXISTS {
        format!(
            "The child workflow could not be started - per its workflow_id_reuse_policy, it conflicts with another workflow with the same id: {}",
            workflow_id
        )
    } else {
        format!("The child workflow could not be started. Reason: {}", cause)
    }
}

impl Failure {
    /// Name of the failure kind, used when re-reporting it
    pub fn type_name(&self) -> &str {
        match self {
            Self::Application(app) | Self::UnregisteredErrorType(app) => &app.error_type,
            Self::Timeout { .. } => "TimeoutError",
            Self::Canceled { .. } => "CanceledError",
            Self::ChildWorkflowTerminated => "ChildWorkflowTerminatedError",
            Self::ChildWorkflowTimeout => "ChildWorkflowTimeoutError",
            Self::StartChildFailed { cause, .. } if cause == START_CHILD_ALREADY_EXISTS => {
                "WorkflowExecutionAlreadyStartedFailure"
            }
            Self::StartChildFailed { .. } => "StartChildWorkflowFailed",
            Self::ExternalSignalFailed { .. } => "ExternalSignalFailed",
            Self::Other { .. } => "Error",
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ChildWorkflowTimeout
        )
    }

    /// The application failure, registered or not
    pub fn application(&self) -> Option<&ApplicationFailure> {
        match self {
            Self::Application(app) | Self::UnregisteredErrorType(app) => Some(app),
            _ => None,
        }
    }

    /// Wire form of this failure
    pub fn to_failure_info(&self) -> FailureInfo {
        match self {
            Self::Application(app) | Self::UnregisteredErrorType(app) => FailureInfo {
                message: app.message.clone(),
                stack_trace: app.stack_trace.join("\n"),
                application_failure_info: Some(ApplicationFailureInfo {
                    error_type: app.error_type.clone(),
                    non_retryable: app.non_retryable,
                    details: (!app.details.is_null())
                        .then(|| encode_payloads(std::slice::from_ref(&app.details))),
                }),
                ..FailureInfo::default()
            },
            Self::Timeout { timeout_type } => FailureInfo {
                message: self.to_string(),
                timeout_failure_info: Some(TimeoutFailureInfo {
                    timeout_type: format!("TIMEOUT_TYPE_{}", timeout_type),
                }),
                ..FailureInfo::default()
            },
            Self::Canceled { details } => FailureInfo {
                message: self.to_string(),
                canceled_failure_info: Some(CanceledFailureInfo {
                    details: (!details.is_null())
                        .then(|| encode_payloads(std::slice::from_ref(details))),
                }),
                ..FailureInfo::default()
            },
            other => FailureInfo::application(other.type_name(), other.to_string()),
        }
    }
}

/// Maps failure type names to decoders for structured error objects.
///
/// Populate it before running workflows. Names that were never registered
/// decode to [`Failure::UnregisteredErrorType`] and are logged.
#[derive(Default)]
pub struct ErrorRegistry {
    decoders: RwLock<HashMap<String, Decoder>>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder building an error object from the failure
    pub fn register<E, F>(&self, error_type: impl Into<String>, decode: F)
    where
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(&ApplicationFailure) -> E + Send + Sync + 'static,
    {
        let decoder: Decoder = Arc::new(move |failure: &ApplicationFailure| {
            Some(Arc::new(decode(failure)) as DecodedError)
        });
        self.decoders.write().insert(error_type.into(), decoder);
    }

    /// Register an error type that is deserialized from the failure details
    pub fn register_deserialize<E>(&self, error_type: impl Into<String>)
    where
        E: std::error::Error + DeserializeOwned + Send + Sync + 'static,
    {
        let error_type = error_type.into();
        let name = error_type.clone();
        let decoder: Decoder = Arc::new(move |failure: &ApplicationFailure| {
            match serde_json::from_value::<E>(failure.details.clone()) {
                Ok(decoded) => Some(Arc::new(decoded) as DecodedError),
                Err(e) => {
                    error!(error_type = %name, error = %e, "Failed to deserialize failure details");
                    None
                }
            }
        });
        self.decoders.write().insert(error_type, decoder);
    }

    pub fn contains(&self, error_type: &str) -> bool {
        self.decoders.read().contains_key(error_type)
    }

    /// Turn a wire failure into the failure workflow code sees
    pub fn failure_from(&self, info: &FailureInfo) -> Failure {
        if let Some(app) = &info.application_failure_info {
            return self.application_failure(info, app);
        }

        if info.timeout_failure_info.is_some() {
            return Failure::Timeout {
                timeout_type: info.timeout_type().unwrap_or("UNSPECIFIED").to_string(),
            };
        }

        if let Some(canceled) = &info.canceled_failure_info {
            return Failure::Canceled {
                details: decode_details(canceled.details.as_ref()),
            };
        }

        Failure::Other {
            message: info.message.clone(),
        }
    }

    fn application_failure(&self, info: &FailureInfo, app: &ApplicationFailureInfo) -> Failure {
        let details = decode_details(app.details.as_ref());
        let message = if info.message.is_empty() {
            match &details {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            }
        } else {
            info.message.clone()
        };

        let mut failure = ApplicationFailure {
            error_type: app.error_type.clone(),
            message,
            details,
            non_retryable: app.non_retryable,
            stack_trace: info
                .stack_trace
                .lines()
                .map(str::to_string)
                .filter(|l| !l.is_empty())
                .collect(),
            decoded: None,
        };

        let decoder = self.decoders.read().get(&app.error_type).cloned();
        match decoder {
            Some(decode) => {
                failure.decoded = decode(&failure);
                Failure::Application(failure)
            }
            None => {
                error!(
                    error_type = %app.error_type,
                    message = %failure.message,
                    "Failure type is not registered, surfacing it as an unregistered error"
                );
                Failure::UnregisteredErrorType(failure)
            }
        }
    }
}

impl fmt::Debug for ErrorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.decoders.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("ErrorRegistry").field("types", &names).finish()
    }
}

fn decode_details(details: Option<&Value>) -> Value {
    match decode_payloads(details) {
        Ok(values) => collapse(values),
        Err(e) => {
            error!(error = %e, "Failed to decode failure details");
            Value::Null
        }
    }
}
