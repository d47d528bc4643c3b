//! Routing of history notifications to the code waiting on them.

use crate::workflow::failure::Failure;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use weft_core::{EventTarget, InternalError};

/// What happened to a target, as derived from a history event
#[derive(Debug, Clone)]
pub enum Notification {
    /// Operation started; carries the workflow input or the child execution
    Started(Value),
    Completed(Value),
    Failed(Failure),
    /// Timer fired
    Fired,
    /// Timer cancellation recorded
    Canceled,
    Signaled { name: String, input: Value },
}

/// Kind of a [`Notification`], used to pick handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Started,
    Completed,
    Failed,
    Fired,
    Canceled,
    Signaled,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Started(_) => NotificationKind::Started,
            Self::Completed(_) => NotificationKind::Completed,
            Self::Failed(_) => NotificationKind::Failed,
            Self::Fired => NotificationKind::Fired,
            Self::Canceled => NotificationKind::Canceled,
            Self::Signaled { .. } => NotificationKind::Signaled,
        }
    }
}

/// Callback invoked for a matching notification
pub type Handler = Arc<dyn Fn(&Notification) -> Result<(), InternalError> + Send + Sync>;

struct Registration {
    kind: Option<NotificationKind>,
    handler: Handler,
}

/// Maps targets to handlers.
///
/// A handler registered without a kind receives every notification for its
/// target. Handlers run in registration order, outside the registry lock,
/// so they may register further handlers.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Mutex<HashMap<EventTarget, Vec<Registration>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler<F>(&self, target: EventTarget, kind: Option<NotificationKind>, handler: F)
    where
        F: Fn(&Notification) -> Result<(), InternalError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .entry(target)
            .or_default()
            .push(Registration {
                kind,
                handler: Arc::new(handler),
            });
    }

    /// Deliver a notification, returning how many handlers saw it
    pub fn dispatch(&self, target: EventTarget, notification: &Notification) -> Result<usize, InternalError> {
        let kind = notification.kind();
        let matching: Vec<Handler> = self
            .handlers
            .lock()
            .get(&target)
            .map(|registrations| {
                registrations
                    .iter()
                    .filter(|r| r.kind.map_or(true, |k| k == kind))
                    .map(|r| Arc::clone(&r.handler))
                    .collect()
            })
            .unwrap_or_default();

        for handler in &matching {
            handler(notification)?;
        }
        Ok(matching.len())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("targets", &self.handlers.lock().len())
            .finish()
    }
}
