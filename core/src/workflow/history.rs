//! A workflow run's full history and its split into workflow task windows.

use crate::error::{CoreResult, InternalError};
use crate::workflow::event::{EventType, HistoryEvent};
use crate::workflow::window::HistoryWindow;
use std::iter::Peekable;
use std::slice::Iter;

/// Ordered, append-only sequence of events of one workflow run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    events: Vec<HistoryEvent>,
}

impl History {
    pub fn new(events: Vec<HistoryEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn first_event(&self) -> Option<&HistoryEvent> {
        self.events.first()
    }

    pub fn last_event(&self) -> Option<&HistoryEvent> {
        self.events.last()
    }

    pub fn find_event_by_id(&self, id: i64) -> Option<&HistoryEvent> {
        self.events.iter().find(|event| event.id() == id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Split the history into one window per workflow task
    pub fn windows(&self) -> HistoryWindows<'_> {
        HistoryWindows {
            events: self.events.iter().peekable(),
        }
    }

    /// Collect every window, failing on the first invalid one
    pub fn collect_windows(&self) -> CoreResult<Vec<HistoryWindow>> {
        Ok(self.windows().collect::<Result<Vec<_>, _>>()?)
    }
}

impl From<Vec<HistoryEvent>> for History {
    fn from(events: Vec<HistoryEvent>) -> Self {
        Self::new(events)
    }
}

/// Iterator over the workflow task windows of a history.
///
/// A window runs up to and including a workflow task completion, followed by
/// the command events that task produced.
pub struct HistoryWindows<'a> {
    events: Peekable<Iter<'a, HistoryEvent>>,
}

impl Iterator for HistoryWindows<'_> {
    type Item = Result<HistoryWindow, InternalError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.peek()?;

        let mut window = HistoryWindow::new();
        for event in self.events.by_ref() {
            if let Err(e) = window.add(event.clone()) {
                return Some(Err(e));
            }
            if event.event_type() == EventType::WorkflowTaskCompleted {
                break;
            }
        }

        while let Some(event) = self.events.next_if(|e| e.event_type().is_command_event()) {
            if let Err(e) = window.add(event.clone()) {
                return Some(Err(e));
            }
        }

        Some(Ok(window))
    }
}
