//! GRBL machine commands
//!
//! Real-time single-byte commands, system commands and jog formatting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Run the homing cycle
pub const HOME: &str = "$H";
/// Clear an alarm lock
pub const UNLOCK: &str = "$X";

/// Single-byte commands that GRBL acts on immediately, outside the line buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RealtimeCommand {
    /// `!` feed hold
    FeedHold,
    /// `~` cycle start / resume
    CycleStart,
    /// `?` status report query
    StatusQuery,
    /// `0x18` (Ctrl-X) soft reset
    SoftReset,
}

impl RealtimeCommand {
    /// Byte written to the wire
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::FeedHold => b'!',
            Self::CycleStart => b'~',
            Self::StatusQuery => b'?',
            Self::SoftReset => 0x18,
        }
    }

    /// Recognise a real-time command typed as text
    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim() {
            "!" => Some(Self::FeedHold),
            "~" => Some(Self::CycleStart),
            "?" => Some(Self::StatusQuery),
            "\u{18}" => Some(Self::SoftReset),
            s if s.eq_ignore_ascii_case("reset") => Some(Self::SoftReset),
            _ => None,
        }
    }
}

impl fmt::Display for RealtimeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeedHold => write!(f, "Feed hold (!)"),
            Self::CycleStart => write!(f, "Cycle start (~)"),
            Self::StatusQuery => write!(f, "Status query (?)"),
            Self::SoftReset => write!(f, "Soft reset (Ctrl-X)"),
        }
    }
}

/// Jog axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn letter(&self) -> char {
        match self {
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
        }
    }
}

/// Jog direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Positive,
    Negative,
}

/// How a jog is expressed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JogStyle {
    /// GRBL 1.1 jog: `$J=G91 X1 F500`
    #[default]
    Grbl,
    /// Manual jog trainer protocol: `X+`, `Y-`
    Manual,
}

/// One incremental jog step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JogCommand {
    /// Axis to move
    pub axis: Axis,
    /// Direction of travel
    pub direction: Direction,
    /// Step length in machine units
    pub step: f64,
    /// Feed rate in units/min
    pub feed_rate: f64,
}

impl JogCommand {
    /// Create a jog step
    pub fn new(axis: Axis, direction: Direction, step: f64, feed_rate: f64) -> Self {
        Self {
            axis,
            direction,
            step,
            feed_rate,
        }
    }

    /// Parse an `X+` / `y-` style shorthand
    pub fn parse_shorthand(text: &str, step: f64, feed_rate: f64) -> Option<Self> {
        let mut chars = text.trim().chars();
        let axis = match chars.next()?.to_ascii_uppercase() {
            'X' => Axis::X,
            'Y' => Axis::Y,
            'Z' => Axis::Z,
            _ => return None,
        };
        let direction = match chars.next()? {
            '+' => Direction::Positive,
            '-' => Direction::Negative,
            _ => return None,
        };
        if chars.next().is_some() {
            return None;
        }
        Some(Self::new(axis, direction, step, feed_rate))
    }

    /// Format the jog as a command line
    pub fn to_line(&self, style: JogStyle) -> String {
        let sign = match self.direction {
            Direction::Positive => "",
            Direction::Negative => "-",
        };
        match style {
            JogStyle::Grbl => format!(
                "$J=G91 {}{}{} F{}",
                self.axis.letter(),
                sign,
                self.step,
                self.feed_rate
            ),
            JogStyle::Manual => {
                let symbol = match self.direction {
                    Direction::Positive => '+',
                    Direction::Negative => '-',
                };
                format!("{}{}", self.axis.letter(), symbol)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_bytes() {
        assert_eq!(RealtimeCommand::FeedHold.as_byte(), b'!');
        assert_eq!(RealtimeCommand::CycleStart.as_byte(), b'~');
        assert_eq!(RealtimeCommand::StatusQuery.as_byte(), b'?');
        assert_eq!(RealtimeCommand::SoftReset.as_byte(), 0x18);
    }

    #[test]
    fn test_realtime_from_text() {
        assert_eq!(RealtimeCommand::from_text("!"), Some(RealtimeCommand::FeedHold));
        assert_eq!(RealtimeCommand::from_text("RESET"), Some(RealtimeCommand::SoftReset));
        assert_eq!(RealtimeCommand::from_text("\u{18}"), Some(RealtimeCommand::SoftReset));
        assert_eq!(RealtimeCommand::from_text("G0 X1"), None);
    }

    #[test]
    fn test_jog_formatting() {
        let jog = JogCommand::new(Axis::X, Direction::Positive, 1.0, 500.0);
        assert_eq!(jog.to_line(JogStyle::Grbl), "$J=G91 X1 F500");
        assert_eq!(jog.to_line(JogStyle::Manual), "X+");

        let jog = JogCommand::new(Axis::Y, Direction::Negative, 0.5, 250.0);
        assert_eq!(jog.to_line(JogStyle::Grbl), "$J=G91 Y-0.5 F250");
        assert_eq!(jog.to_line(JogStyle::Manual), "Y-");
    }

    #[test]
    fn test_jog_shorthand() {
        let jog = JogCommand::parse_shorthand("y-", 1.0, 500.0).unwrap();
        assert_eq!(jog.axis, Axis::Y);
        assert_eq!(jog.direction, Direction::Negative);
        assert!(JogCommand::parse_shorthand("A+", 1.0, 500.0).is_none());
        assert!(JogCommand::parse_shorthand("X+1", 1.0, 500.0).is_none());
        assert!(JogCommand::parse_shorthand("X", 1.0, 500.0).is_none());
    }
}
