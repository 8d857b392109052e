//! Owned event values and channel-backed sink
//!
//! Provides:
//! - `SinkEvent`, one variant per `EventSink` callback
//! - `ChannelSink`, which forwards every callback into a tokio channel so a
//!   consumer thread or task receives events in production order

use super::listener::{ErrorKind, EventSink};
use crate::data::{Position, Progress};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One notification from the link or the streamer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SinkEvent {
    /// Connection or machine status changed
    StatusChanged {
        /// State tag ("Idle", "Connected", "Error", ...)
        state: String,
        /// Raw report or human-readable detail
        raw: String,
    },
    /// Work position update
    PositionUpdated(Position),
    /// Log text
    Log(String),
    /// Job progress
    Progress(Progress),
    /// Failure of a given kind
    Error {
        /// Failure category
        kind: ErrorKind,
        /// Description
        message: String,
    },
}

impl std::fmt::Display for SinkEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkEvent::StatusChanged { state, raw } => write!(f, "Status: {} ({})", state, raw),
            SinkEvent::PositionUpdated(position) => write!(f, "Position: {}", position),
            SinkEvent::Log(text) => write!(f, "{}", text),
            SinkEvent::Progress(progress) => write!(f, "Progress: {}", progress),
            SinkEvent::Error { kind, message } => write!(f, "Error ({}): {}", kind, message),
        }
    }
}

/// Event sink that forwards into an unbounded tokio channel
///
/// Sending never blocks, so the reader and streamer threads are not held up
/// by a slow consumer. Events sent after the receiver is dropped are
/// discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SinkEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }
}

impl EventSink for ChannelSink {
    fn on_status_change(&self, state: &str, raw: &str) {
        self.forward(SinkEvent::StatusChanged {
            state: state.to_string(),
            raw: raw.to_string(),
        });
    }

    fn on_position_update(&self, position: Position) {
        self.forward(SinkEvent::PositionUpdated(position));
    }

    fn on_log(&self, text: &str) {
        self.forward(SinkEvent::Log(text.to_string()));
    }

    fn on_progress(&self, progress: Progress) {
        self.forward(SinkEvent::Progress(progress));
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.forward(SinkEvent::Error {
            kind,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.on_log("GRBL: ok");
        sink.on_status_change("Idle", "<Idle|WPos:0,0,0>");
        sink.on_position_update(Position::new(1.0, 2.0, 3.0));
        sink.on_progress(Progress::new(1, 2));

        assert_eq!(rx.try_recv().unwrap(), SinkEvent::Log("GRBL: ok".to_string()));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SinkEvent::StatusChanged { ref state, .. } if state == "Idle"
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            SinkEvent::PositionUpdated(Position::new(1.0, 2.0, 3.0))
        );
        assert_eq!(rx.try_recv().unwrap(), SinkEvent::Progress(Progress::new(1, 2)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_log("ignored");
        sink.on_error(ErrorKind::Transport, "ignored");
    }

    #[test]
    fn test_default_on_error_forwards_to_log() {
        use parking_lot::Mutex;

        #[derive(Default)]
        struct LogOnly(Mutex<Vec<String>>);
        impl EventSink for LogOnly {
            fn on_log(&self, text: &str) {
                self.0.lock().push(text.to_string());
            }
        }

        let sink = LogOnly::default();
        sink.on_error(ErrorKind::Decode, "bad bytes");
        assert_eq!(sink.0.lock().as_slice(), ["[decode] bad bytes"]);
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let (sink, mut rx) = ChannelSink::new();
        std::thread::spawn(move || sink.on_log("from reader"))
            .join()
            .unwrap();
        assert_eq!(rx.recv().await, Some(SinkEvent::Log("from reader".to_string())));
    }
}
