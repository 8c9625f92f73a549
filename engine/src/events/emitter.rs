//! Ordered, per-request event emitter.
//!
//! The emitter is the single producer for one request's stream. Events go out
//! in call order over an unbounded channel. The two terminal methods consume
//! the emitter, so a run can send at most one of `error`/`complete` and
//! nothing after it. A run that drops the emitter without a terminal event
//! closes the stream, which consumers read as failure.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::types::ProgressEvent;

/// Default keep-alive interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// The consumer side went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event stream closed by consumer")]
pub struct StreamClosed;

/// Receiving end of a request's event stream.
pub type EventStream = mpsc::UnboundedReceiver<ProgressEvent>;

pub struct EventEmitter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    heartbeat_interval: Duration,
    last_emit: Instant,
    emitted: u64,
}

impl EventEmitter {
    /// Create an emitter and the stream it feeds.
    pub fn channel(heartbeat_interval: Duration) -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Self {
            tx,
            heartbeat_interval,
            last_emit: Instant::now(),
            emitted: 0,
        };
        (emitter, rx)
    }

    /// Number of events sent so far, heartbeats included.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&mut self, event: ProgressEvent) -> Result<(), StreamClosed> {
        let event_type = event.event_type();
        self.tx.send(event).map_err(|_| StreamClosed)?;
        self.emitted += 1;
        self.last_emit = Instant::now();
        tracing::debug!(event_type, seq = self.emitted, "Event emitted");
        Ok(())
    }

    pub fn message(&mut self, message: impl Into<String>) -> Result<(), StreamClosed> {
        self.send(ProgressEvent::message(message))
    }

    pub fn read(&mut self, filepath: impl Into<String>) -> Result<(), StreamClosed> {
        self.send(ProgressEvent::read(filepath))
    }

    pub fn edit(
        &mut self,
        filepath: impl Into<String>,
        old_str: &str,
        new_str: &str,
    ) -> Result<(), StreamClosed> {
        self.send(ProgressEvent::edit(filepath, old_str, new_str))
    }

    pub fn bash(
        &mut self,
        command: impl Into<String>,
        output: impl Into<String>,
    ) -> Result<(), StreamClosed> {
        self.send(ProgressEvent::bash(command, output))
    }

    /// Step boundary: detect a departed consumer and send a heartbeat if
    /// nothing has gone out for a full interval.
    pub fn checkpoint(&mut self) -> Result<(), StreamClosed> {
        if self.tx.is_closed() {
            return Err(StreamClosed);
        }
        if self.last_emit.elapsed() >= self.heartbeat_interval {
            self.send(ProgressEvent::heartbeat())?;
        }
        Ok(())
    }

    /// Terminal success. Returns whether the event reached the consumer.
    pub fn complete(mut self, message: impl Into<String>, pr_url: Option<String>) -> bool {
        self.send(ProgressEvent::complete(message, pr_url)).is_ok()
    }

    /// Terminal failure. Returns whether the event reached the consumer.
    pub fn fail(mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        tracing::error!(%message, "Run failed");
        self.send(ProgressEvent::error(message)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut EventStream) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (mut emitter, mut rx) = EventEmitter::channel(DEFAULT_HEARTBEAT_INTERVAL);
        emitter.message("one").unwrap();
        emitter.read("a.py").unwrap();
        emitter.bash("git add .", "").unwrap();
        assert!(emitter.complete("done", None));

        let events = drain(&mut rx);
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["AI Message", "Tool: Read", "Tool: Bash", "complete"]);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_only_after_interval() {
        let (mut emitter, mut rx) = EventEmitter::channel(Duration::from_secs(2));
        emitter.checkpoint().unwrap();
        assert!(drain(&mut rx).is_empty());

        tokio::time::advance(Duration::from_millis(2100)).await;
        emitter.checkpoint().unwrap();
        let events = drain(&mut rx);
        assert_eq!(events, vec![ProgressEvent::heartbeat()]);

        // The heartbeat itself resets the clock.
        emitter.checkpoint().unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_event_resets_heartbeat_clock() {
        let (mut emitter, mut rx) = EventEmitter::channel(Duration::from_secs(2));
        tokio::time::advance(Duration::from_millis(1500)).await;
        emitter.message("progress").unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;
        emitter.checkpoint().unwrap();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_heartbeat());
    }

    #[tokio::test]
    async fn test_closed_consumer_detected_at_checkpoint() {
        let (mut emitter, rx) = EventEmitter::channel(DEFAULT_HEARTBEAT_INTERVAL);
        drop(rx);
        assert_eq!(emitter.checkpoint(), Err(StreamClosed));
        assert_eq!(emitter.message("x"), Err(StreamClosed));
        assert!(!emitter.fail("gone"));
    }

    #[tokio::test]
    async fn test_drop_without_terminal_closes_stream() {
        let (mut emitter, mut rx) = EventEmitter::channel(DEFAULT_HEARTBEAT_INTERVAL);
        emitter.message("started").unwrap();
        drop(emitter);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
