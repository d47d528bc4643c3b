//! SDK feature flags recorded in history.
//!
//! A flag is recorded on the workflow task completion of the first task that
//! relied on it. Replays only switch behavior on once history says so, which
//! keeps old histories replaying the way they originally ran.

use crate::error::InternalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum SdkFlag {
    /// Deliver signals before other events of the same workflow task
    HandleSignalsFirst = 1,
    /// Buffer signals that arrive before a handler is registered
    SaveFirstTaskSignals = 2,
}

impl SdkFlag {
    pub const ALL: [SdkFlag; 2] = [Self::HandleSignalsFirst, Self::SaveFirstTaskSignals];

    pub fn code(&self) -> u32 {
        *self as u32
    }
}

impl TryFrom<u32> for SdkFlag {
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|flag| flag.code() == code)
            .ok_or(code)
    }
}

impl fmt::Display for SdkFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Parse flag codes, rejecting the whole set if any code is unknown.
pub fn parse_flags(codes: &[u32]) -> Result<BTreeSet<SdkFlag>, InternalError> {
    let mut flags = BTreeSet::new();
    let mut unknown = Vec::new();
    for &code in codes {
        match SdkFlag::try_from(code) {
            Ok(flag) => {
                flags.insert(flag);
            }
            Err(code) => unknown.push(code.to_string()),
        }
    }

    if unknown.is_empty() {
        Ok(flags)
    } else {
        Err(InternalError::UnknownSdkFlag(unknown.join(",")))
    }
}
