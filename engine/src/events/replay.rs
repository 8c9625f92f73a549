//! Reconstructing a run's outcome from its event stream.
//!
//! Heartbeats are ignored. The first terminal event decides the outcome; a
//! stream that ends without one is a failure, never an unknown success.

use serde::{Deserialize, Serialize};

use super::types::ProgressEvent;

/// Failure message for a stream that ended before a terminal event.
pub const DISCONNECTED_MESSAGE: &str = "connection closed before a terminal event";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StreamOutcome {
    Succeeded {
        message: String,
        pr_url: Option<String>,
    },
    Failed {
        message: String,
    },
}

impl StreamOutcome {
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = ProgressEvent>,
    {
        let mut tracker = OutcomeTracker::default();
        for event in events {
            tracker.observe(&event);
        }
        tracker.finish()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Incremental version of [`StreamOutcome::from_events`] for live streams.
#[derive(Debug, Clone, Default)]
pub struct OutcomeTracker {
    terminal: Option<StreamOutcome>,
    events: usize,
    heartbeats: usize,
    after_terminal: usize,
}

impl OutcomeTracker {
    pub fn observe(&mut self, event: &ProgressEvent) {
        if self.terminal.is_some() {
            self.after_terminal += 1;
            tracing::warn!(event_type = event.event_type(), "Event after terminal event ignored");
            return;
        }
        self.events += 1;
        match event {
            ProgressEvent::Heartbeat { .. } => self.heartbeats += 1,
            ProgressEvent::Complete { message, pr_url } => {
                self.terminal = Some(StreamOutcome::Succeeded {
                    message: message.clone(),
                    pr_url: pr_url.clone(),
                });
            }
            ProgressEvent::Error { message } => {
                self.terminal = Some(StreamOutcome::Failed {
                    message: message.clone(),
                });
            }
            _ => {}
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }

    /// Events seen up to and including the terminal one.
    pub fn events(&self) -> usize {
        self.events
    }

    pub fn heartbeats(&self) -> usize {
        self.heartbeats
    }

    /// Events that arrived after the terminal one (protocol violations).
    pub fn after_terminal(&self) -> usize {
        self.after_terminal
    }

    pub fn finish(self) -> StreamOutcome {
        self.terminal.unwrap_or_else(|| StreamOutcome::Failed {
            message: DISCONNECTED_MESSAGE.to_string(),
        })
    }
}
