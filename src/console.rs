//! Event sink that writes to the log
//!
//! Stands in for a graphical front end: every link and streamer event is
//! written through `tracing` under the `grblstream::console` target.

use grblstream_core::{ErrorKind, EventSink, Position, Progress};

/// Prints events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    /// Also print every inbound line and every sent line
    pub verbose: bool,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Whether a log line is routine traffic rather than a notable event
    fn is_traffic(text: &str) -> bool {
        text.starts_with("GRBL: ") || text.starts_with("Sent: ")
    }
}

impl EventSink for ConsoleSink {
    fn on_status_change(&self, state: &str, raw: &str) {
        tracing::info!(target: "grblstream::console", state, "{}", raw);
    }

    fn on_position_update(&self, position: Position) {
        tracing::debug!(target: "grblstream::console", "Position {}", position);
    }

    fn on_log(&self, text: &str) {
        if Self::is_traffic(text) && !self.verbose {
            tracing::debug!(target: "grblstream::console", "{}", text);
        } else {
            tracing::info!(target: "grblstream::console", "{}", text);
        }
    }

    fn on_progress(&self, progress: Progress) {
        tracing::info!(
            target: "grblstream::console",
            lines_sent = progress.lines_sent,
            total_lines = progress.total_lines,
            "Progress: {}",
            progress
        );
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        match kind {
            ErrorKind::Decode => {
                tracing::warn!(target: "grblstream::console", %kind, "{}", message)
            }
            _ => tracing::error!(target: "grblstream::console", %kind, "{}", message),
        }
    }
}
