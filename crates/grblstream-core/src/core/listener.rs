//! Event sink interface
//!
//! Defines the observer trait that receives link and streamer events.

use crate::data::{Position, Progress};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of failure reported through [`EventSink::on_error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Open, read or write failure on the transport
    Transport,
    /// Bytes from the controller were not valid UTF-8
    Decode,
    /// Controller rejected a streamed line
    Protocol,
    /// Operation not valid in the current state
    Usage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Decode => write!(f, "decode"),
            Self::Protocol => write!(f, "protocol"),
            Self::Usage => write!(f, "usage"),
        }
    }
}

/// Receiver of status, position, log and progress notifications
///
/// Implementations are called from the link's reader thread and the
/// streamer's execution thread. They must return quickly and never block on
/// the core; hand events to another thread if work is needed.
pub trait EventSink: Send + Sync {
    /// Called on connection changes and on every status report
    fn on_status_change(&self, _state: &str, _raw: &str) {}

    /// Called when a status report carries a work position
    fn on_position_update(&self, _position: Position) {}

    /// Called for every inbound line and notable outbound action
    fn on_log(&self, _text: &str) {}

    /// Called after each acknowledged line of a streaming job
    fn on_progress(&self, _progress: Progress) {}

    /// Called for every failure, tagged by kind
    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.on_log(&format!("[{}] {}", kind, message));
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {}
