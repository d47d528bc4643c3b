//! Tracking of suspended workflow code for the `__stack_trace` query.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Name of the built-in query answered with the current suspension points
pub const STACK_TRACE_QUERY_NAME: &str = "__stack_trace";

#[derive(Debug, Default)]
struct Entries {
    next_key: u64,
    entries: BTreeMap<u64, String>,
}

/// Records where workflow code is currently suspended.
///
/// Every pending wait (a future being awaited, `wait_for_any`, `wait_until`)
/// registers the caller location and what it waits on while it is pending.
#[derive(Debug, Clone, Default)]
pub struct StackTraceTracker {
    entries: Arc<Mutex<Entries>>,
}

impl StackTraceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, entry: String) -> u64 {
        let mut entries = self.entries.lock();
        let key = entries.next_key;
        entries.next_key += 1;
        entries.entries.insert(key, entry);
        key
    }

    pub(crate) fn clear(&self, key: u64) {
        self.entries.lock().entries.remove(&key);
    }

    /// Number of suspension points currently recorded
    pub fn count(&self) -> usize {
        self.entries.lock().entries.len()
    }
}

impl fmt::Display for StackTraceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        write!(f, "Coroutine count: {}", entries.entries.len())?;
        for entry in entries.entries.values() {
            write!(f, "\n\n{}", entry)?;
        }
        writeln!(f)
    }
}

/// One suspension point of workflow code.
///
/// Registered with the tracker while pending, removed once resumed or dropped.
pub(crate) struct Suspension {
    tracker: Option<StackTraceTracker>,
    location: &'static Location<'static>,
    waiting_on: String,
    key: Option<u64>,
}

impl Suspension {
    pub(crate) fn new(
        tracker: Option<StackTraceTracker>,
        location: &'static Location<'static>,
        waiting_on: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            location,
            waiting_on: waiting_on.into(),
            key: None,
        }
    }

    pub(crate) fn suspend(&mut self) {
        if self.key.is_some() {
            return;
        }
        if let Some(tracker) = &self.tracker {
            self.key = Some(tracker.record(format!(
                "{} waiting on {}",
                self.location, self.waiting_on
            )));
        }
    }

    pub(crate) fn resume(&mut self) {
        if let (Some(tracker), Some(key)) = (&self.tracker, self.key.take()) {
            tracker.clear(key);
        }
    }
}

impl Drop for Suspension {
    fn drop(&mut self) {
        self.resume();
    }
}
