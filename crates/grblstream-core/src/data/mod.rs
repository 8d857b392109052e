//! Data models for connection state, machine status, position and job progress
//!
//! This module provides:
//! - Connection state of the serial link
//! - Latest machine status reported by the controller
//! - Work position (X, Y, Z)
//! - Streaming job run state and progress

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the serial link
///
/// Owned by the link; everyone else sees snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No transport open
    #[default]
    Disconnected,
    /// Transport is being opened and settled
    Connecting,
    /// Transport open and reader running
    Connected,
    /// Transport failed; teardown in progress
    Faulted,
}

impl ConnectionState {
    /// Check if the link is usable for sending
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if a transition from this state to `target` is valid.
    ///
    /// - Disconnected → Connecting
    /// - Connecting → Connected, Faulted, Disconnected
    /// - Connected → Faulted, Disconnected
    /// - Faulted → Disconnected, Connecting
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        use ConnectionState::*;
        if *self == target {
            return true;
        }
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected | Faulted | Disconnected)
                | (Connected, Faulted | Disconnected)
                | (Faulted, Disconnected | Connecting)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Faulted => write!(f, "Faulted"),
        }
    }
}

/// Most recent machine status reported by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStatus {
    /// State tag, e.g. "Idle", "Run", "Hold", "Alarm"
    pub state: String,
    /// Original report text including the angle brackets
    pub raw: String,
}

impl MachineStatus {
    /// Create a new machine status
    pub fn new(state: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            raw: raw.into(),
        }
    }

    /// Check if the controller reports an alarm
    pub fn is_alarm(&self) -> bool {
        self.state.starts_with("Alarm")
    }

    /// Check if the controller is in feed hold
    pub fn is_hold(&self) -> bool {
        self.state.starts_with("Hold")
    }
}

/// Work position in controller units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a position from its three axes
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// Run state of a streaming job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    /// No job started yet
    #[default]
    Idle,
    /// Lines are being sent
    Running,
    /// Sending suspended until resumed
    Paused,
    /// Stopped on request
    Stopped,
    /// Every line acknowledged
    Finished,
    /// A line was rejected or the link failed
    Errored,
}

impl RunState {
    /// Check if a job in this state owns the link
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Running | RunState::Paused)
    }

    /// Check if this state ends a job
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Stopped | RunState::Finished | RunState::Errored
        )
    }

    /// Check if a transition from this state to `target` is valid.
    ///
    /// Running is also reachable from Idle or any terminal state, which is
    /// how a new job begins.
    pub fn can_transition_to(&self, target: RunState) -> bool {
        use RunState::*;
        match (self, target) {
            (Idle | Stopped | Finished | Errored, Running) => true,
            (Running, Paused) => true,
            (Paused, Running) => true,
            (Running, Finished | Errored | Stopped) => true,
            (Paused, Stopped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Finished => write!(f, "Finished"),
            Self::Errored => write!(f, "Errored"),
        }
    }
}

/// Progress of a streaming job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Fraction of lines acknowledged, 0.0 to 1.0
    pub fraction: f64,
    /// Lines acknowledged so far
    pub lines_sent: usize,
    /// Lines in the program
    pub total_lines: usize,
}

impl Progress {
    /// Build progress for `lines_sent` out of `total_lines`
    pub fn new(lines_sent: usize, total_lines: usize) -> Self {
        let fraction = if total_lines == 0 {
            0.0
        } else {
            lines_sent as f64 / total_lines as f64
        };
        Self {
            fraction,
            lines_sent,
            total_lines,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% ({}/{})",
            self.fraction * 100.0,
            self.lines_sent,
            self.total_lines
        )
    }
}
