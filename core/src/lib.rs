//! # weft core
//!
//! Language-agnostic model for replaying workflow code against history.
//!
//! ## What's in Core vs SDK
//!
//! **Core** contains the data model shared by any workflow runtime:
//! - History events and their correlation targets
//! - Workflow task windows and SDK feature flags
//! - Commands, retry policies and failure payloads
//! - History parsing (JSON and protobuf) and command serialization
//!
//! **SDK** contains the Rust runtime:
//! - Futures, workflow context and the coroutine driver
//! - Registries, saga support, queries
//! - Replay testing utilities
//!
//! ## Modules
//!
//! - [`workflow`] - Events, targets, windows, commands, retry policy
//! - [`serialization`] - History decoding and command encoding
//! - [`error`] - Core error types

pub mod error;
pub mod serialization;
pub mod workflow;

// Re-export error types
pub use error::{ClientError, CoreError, CoreResult, InternalError, NonDeterminismError};

// Re-export workflow types
pub use workflow::{
    Command, EventTarget, EventType, FailureInfo, History, HistoryEvent, HistoryWindow,
    RetryPolicy, SdkFlag, TargetType,
};

// Re-export serialization entry points
pub use serialization::{correct_event_types, history_from_json, history_from_protobuf, CommandSerializer};
