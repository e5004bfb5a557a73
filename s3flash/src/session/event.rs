//! Events the controller publishes to the user-facing surface.

use std::fmt;

use chrono::{DateTime, Local};

use crate::{
    progress::Progress,
    session::state::{Indicator, SessionState},
};

/// One timestamped line of the session log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// When the line was recorded.
    pub timestamp: DateTime<Local>,
    /// Message text.
    pub message: String,
}

impl LogEntry {
    /// A log entry stamped now.
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Something the user-facing surface should render.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session moved to a new state.
    StateChanged {
        /// New state.
        state: SessionState,
        /// Indicator color for it.
        indicator: Indicator,
        /// Status line.
        status: String,
    },
    /// Transfer progress moved.
    Progress(Progress),
    /// A line was appended to the session log.
    Log(LogEntry),
}

/// Receives session events. Called synchronously, never with a lock held.
pub trait SessionObserver: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &SessionEvent);
}

impl SessionObserver for () {
    fn on_event(&self, _event: &SessionEvent) {}
}

impl<F> SessionObserver for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event);
    }
}
