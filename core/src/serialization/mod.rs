//! History decoding and command encoding at the transport boundary

pub mod command;
pub mod json;
pub mod proto;

pub use command::CommandSerializer;
pub use json::{correct_event_types, history_from_json};
pub use proto::history_from_protobuf;
