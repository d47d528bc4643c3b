//! Structured failure payload as it appears in history and commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire form of a failure. `details` fields hold encoded payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureInfo {
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stack_trace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_failure_info: Option<ApplicationFailureInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_failure_info: Option<TimeoutFailureInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_failure_info: Option<CanceledFailureInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_failure_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<FailureInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationFailureInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub non_retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutFailureInfo {
    pub timeout_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanceledFailureInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl FailureInfo {
    /// Application failure with an error type name and message
    pub fn application(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            application_failure_info: Some(ApplicationFailureInfo {
                error_type: error_type.into(),
                ..ApplicationFailureInfo::default()
            }),
            ..Self::default()
        }
    }

    /// Read a failure from an event attribute, if present
    pub fn from_attribute(value: Option<&Value>) -> Option<Self> {
        value.and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Timeout type without its enum prefix, e.g. `START_TO_CLOSE`
    pub fn timeout_type(&self) -> Option<&str> {
        self.timeout_failure_info
            .as_ref()
            .map(|info| {
                info.timeout_type
                    .strip_prefix("TIMEOUT_TYPE_")
                    .unwrap_or(&info.timeout_type)
            })
    }
}
