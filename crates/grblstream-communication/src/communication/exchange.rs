//! Single-slot command/response exchange
//!
//! The streamer arms the slot before sending a line and then blocks until
//! the reader thread offers the controller's answer. Only one line is ever
//! in flight, so one slot is enough.
//!
//! GRBL answers lines in the order it received them. The slot counts the
//! answers still owed for lines already written, and an armed slot skips
//! that many answers before taking one. A late `ok` for a line whose wait
//! was cancelled is therefore never credited to a later line.

use parking_lot::{Condvar, Mutex};

/// Result of waiting for a command response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The controller answered with this line
    Line(String),
    /// The link closed before an answer arrived
    LinkClosed,
    /// The wait was cancelled by a stop request
    Cancelled,
}

#[derive(Debug, Default)]
struct SlotState {
    armed: bool,
    /// Answers owed for lines written and not yet answered
    owed: usize,
    /// Answers the armed wait must let pass first
    skip: usize,
    response: Option<String>,
    closed: bool,
    cancelled: bool,
}

/// Hand-off point between the reader thread and a waiting command
#[derive(Debug, Default)]
pub struct ResponseSlot {
    state: Mutex<SlotState>,
    changed: Condvar,
}

impl ResponseSlot {
    /// Create a closed slot; [`ResponseSlot::reopen`] makes it usable
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                closed: true,
                ..SlotState::default()
            }),
            changed: Condvar::new(),
        }
    }

    /// Expect the answer to the next line written. Any stale response is
    /// discarded and answers owed for earlier lines are skipped.
    pub fn arm(&self) {
        let mut state = self.state.lock();
        state.armed = true;
        state.skip = state.owed;
        state.response = None;
    }

    /// Count a line written to the controller; call before the write
    pub fn note_sent(&self) {
        self.state.lock().owed += 1;
    }

    /// Deliver an answer line. Returns false when it was not taken as the
    /// response to the armed wait.
    pub fn offer(&self, line: &str) -> bool {
        let mut state = self.state.lock();
        state.owed = state.owed.saturating_sub(1);
        if !state.armed || state.response.is_some() {
            return false;
        }
        if state.skip > 0 {
            state.skip -= 1;
            return false;
        }
        state.response = Some(line.to_string());
        self.changed.notify_all();
        true
    }

    /// Answers owed for lines already written
    pub fn owed(&self) -> usize {
        self.state.lock().owed
    }

    /// Block until a response, a close or a cancel
    pub fn wait(&self) -> ResponseOutcome {
        let mut state = self.state.lock();
        loop {
            if let Some(line) = state.response.take() {
                state.armed = false;
                return ResponseOutcome::Line(line);
            }
            if state.cancelled {
                state.armed = false;
                return ResponseOutcome::Cancelled;
            }
            if state.closed {
                state.armed = false;
                return ResponseOutcome::LinkClosed;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Abort the current and any later wait until [`ResponseSlot::reset_cancel`]
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        self.changed.notify_all();
    }

    /// Clear a previous cancel; done when a new job claims the link
    pub fn reset_cancel(&self) {
        self.state.lock().cancelled = false;
    }

    /// Mark the link closed and wake any waiter
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.armed = false;
        state.owed = 0;
        state.skip = 0;
        state.response = None;
        self.changed.notify_all();
    }

    /// Make the slot usable again after a new connection
    pub fn reopen(&self) {
        let mut state = self.state.lock();
        state.closed = false;
        state.armed = false;
        state.owed = 0;
        state.skip = 0;
        state.response = None;
    }
}
