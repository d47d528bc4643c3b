//! Workflow history, correlation and command model

pub mod command;
pub mod event;
pub mod event_target;
pub mod failure;
pub mod history;
pub mod payload;
pub mod retry_policy;
pub mod sdk_flags;
pub mod window;

pub use command::{
    ActivityTimeouts, Command, ContinueAsNew, ParentClosePolicy, ScheduleActivity,
    SignalExternalWorkflow, StartChildWorkflow, WorkflowIdReusePolicy, WorkflowTimeouts,
};
pub use event::{EventType, HistoryEvent};
pub use event_target::{EventTarget, TargetType};
pub use failure::{ApplicationFailureInfo, CanceledFailureInfo, FailureInfo, TimeoutFailureInfo};
pub use history::{History, HistoryWindows};
pub use retry_policy::RetryPolicy;
pub use sdk_flags::SdkFlag;
pub use window::HistoryWindow;
