//! Testing utilities: history builders and the replay tester.
//!
//! Available only with the `testing` feature enabled.

mod builders;
mod replay_tester;

pub use builders::HistoryBuilder;
pub use replay_tester::{ReplayError, ReplayTester};
pub use weft_core::correct_event_types;
