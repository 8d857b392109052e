//! GRBL Status Report Parsing
//!
//! Turns a `<state|field|field...>` line into a [`StatusReport`]. Parsing is
//! pure and never fails outright: a malformed position field is recorded in
//! [`StatusReport::field_errors`] and the rest of the report survives.

use grblstream_core::{MachineStatus, Position};
use serde::{Deserialize, Serialize};

/// Prefix of the work position field
pub const WPOS_PREFIX: &str = "WPos:";
/// Prefix of the machine position field
pub const MPOS_PREFIX: &str = "MPos:";
/// Prefix of the combined feed and spindle field
pub const FS_PREFIX: &str = "FS:";

/// Feed and spindle state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedSpindleState {
    /// Current feed rate (units/min)
    pub feed_rate: f64,
    /// Current spindle speed (RPM)
    pub spindle_speed: f64,
}

impl FeedSpindleState {
    /// Parse feed and spindle state (format: "feed,spindle")
    pub fn parse(fs_str: &str) -> Option<Self> {
        let (feed, spindle) = fs_str.split_once(',')?;
        Some(Self {
            feed_rate: feed.trim().parse::<f64>().ok()?,
            spindle_speed: spindle.trim().parse::<f64>().ok()?,
        })
    }
}

/// A field that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The offending field, verbatim
    pub field: String,
    /// Why it was rejected
    pub reason: String,
}

/// Parsed status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Machine state tag (Idle, Run, Hold:0, Alarm, ...)
    pub state: String,
    /// The full line, including angle brackets
    pub raw: String,
    /// Every field after the state tag, verbatim
    pub fields: Vec<String>,
    /// Work position, when a valid `WPos:` field is present
    pub work_position: Option<Position>,
    /// Machine position, when a valid `MPos:` field is present
    pub machine_position: Option<Position>,
    /// Feed and spindle, when a valid `FS:` field is present
    pub feed_spindle: Option<FeedSpindleState>,
    /// Position fields that were present but malformed
    pub field_errors: Vec<FieldError>,
}

impl StatusReport {
    /// The machine status carried by this report
    pub fn machine_status(&self) -> MachineStatus {
        MachineStatus::new(self.state.clone(), self.raw.clone())
    }
}

/// Parse an `x,y,z` triple. Extra axes are ignored.
pub fn parse_xyz(pos_str: &str) -> Result<Position, String> {
    let mut coords = [0.0_f64; 3];
    let mut parts = pos_str.split(',');

    for (axis, slot) in ["x", "y", "z"].iter().zip(coords.iter_mut()) {
        let part = parts
            .next()
            .ok_or_else(|| format!("missing {} coordinate", axis))?;
        let value = part
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid {} coordinate '{}': {}", axis, part, e))?;
        if !value.is_finite() {
            return Err(format!("non-finite {} coordinate '{}'", axis, part));
        }
        *slot = value;
    }

    Ok(Position::new(coords[0], coords[1], coords[2]))
}

/// Comprehensive status parsing
pub struct StatusParser;

impl StatusParser {
    /// Check whether a line is framed as a status report
    pub fn is_status_report(line: &str) -> bool {
        let line = line.trim();
        line.len() >= 2 && line.starts_with('<') && line.ends_with('>')
    }

    /// Parse a status report.
    ///
    /// Returns `None` when the line is not framed by `<` and `>` or carries
    /// no state tag; such lines are plain log text.
    pub fn parse(line: &str) -> Option<StatusReport> {
        let raw = line.trim();
        if !Self::is_status_report(raw) {
            return None;
        }

        let mut parts = raw[1..raw.len() - 1].split('|');
        let state = parts.next()?.trim();
        if state.is_empty() {
            return None;
        }

        let mut report = StatusReport {
            state: state.to_string(),
            raw: raw.to_string(),
            fields: Vec::new(),
            work_position: None,
            machine_position: None,
            feed_spindle: None,
            field_errors: Vec::new(),
        };

        for field in parts {
            report.fields.push(field.to_string());

            if let Some(pos_str) = field.strip_prefix(WPOS_PREFIX) {
                match parse_xyz(pos_str) {
                    Ok(position) => report.work_position = Some(position),
                    Err(reason) => report.field_errors.push(FieldError {
                        field: field.to_string(),
                        reason,
                    }),
                }
            } else if let Some(pos_str) = field.strip_prefix(MPOS_PREFIX) {
                match parse_xyz(pos_str) {
                    Ok(position) => report.machine_position = Some(position),
                    Err(reason) => report.field_errors.push(FieldError {
                        field: field.to_string(),
                        reason,
                    }),
                }
            } else if let Some(fs_str) = field.strip_prefix(FS_PREFIX) {
                report.feed_spindle = FeedSpindleState::parse(fs_str);
            }
        }

        Some(report)
    }

    /// Extract only the machine state tag
    pub fn parse_machine_state(line: &str) -> Option<String> {
        Self::parse(line).map(|report| report.state)
    }

    /// Extract only the work position
    pub fn parse_wpos(line: &str) -> Option<Position> {
        Self::parse(line).and_then(|report| report.work_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_idle_with_wpos() {
        let report = StatusParser::parse("<Idle|WPos:0.000,1.500,-2.250|FS:0,0>").unwrap();
        assert_eq!(report.state, "Idle");
        assert_eq!(report.work_position, Some(Position::new(0.0, 1.5, -2.25)));
        assert_eq!(report.fields, vec!["WPos:0.000,1.500,-2.250", "FS:0,0"]);
        assert_eq!(report.raw, "<Idle|WPos:0.000,1.500,-2.250|FS:0,0>");
        assert!(report.field_errors.is_empty());
    }

    #[test]
    fn test_parse_without_wpos() {
        let report = StatusParser::parse("<Run|MPos:10.000,5.000,2.500|FS:1500,1200>").unwrap();
        assert_eq!(report.state, "Run");
        assert_eq!(report.work_position, None);
        assert_eq!(report.machine_position, Some(Position::new(10.0, 5.0, 2.5)));
        assert_eq!(
            report.feed_spindle,
            Some(FeedSpindleState {
                feed_rate: 1500.0,
                spindle_speed: 1200.0
            })
        );
    }

    #[test]
    fn test_malformed_wpos_keeps_state() {
        let report = StatusParser::parse("<Hold:0|WPos:1.0,abc,3.0>").unwrap();
        assert_eq!(report.state, "Hold:0");
        assert_eq!(report.work_position, None);
        assert_eq!(report.field_errors.len(), 1);
        assert_eq!(report.field_errors[0].field, "WPos:1.0,abc,3.0");
        assert!(report.field_errors[0].reason.contains("y coordinate"));
    }

    #[test]
    fn test_short_and_non_finite_wpos() {
        let report = StatusParser::parse("<Idle|WPos:1.0,2.0>").unwrap();
        assert!(report.work_position.is_none());
        assert!(report.field_errors[0].reason.contains("missing z"));

        let report = StatusParser::parse("<Idle|WPos:NaN,0,0>").unwrap();
        assert!(report.work_position.is_none());
        assert_eq!(report.field_errors.len(), 1);
    }

    #[test]
    fn test_extra_axes_ignored() {
        let pos = StatusParser::parse_wpos("<Idle|WPos:1,2,3,4.5>").unwrap();
        assert_eq!(pos, Position::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_non_status_lines() {
        assert!(StatusParser::parse("ok").is_none());
        assert!(StatusParser::parse("error:20").is_none());
        assert!(StatusParser::parse("[MSG:Caution: Unlocked]").is_none());
        assert!(StatusParser::parse("<Idle|WPos:0,0,0").is_none());
        assert!(StatusParser::parse("<>").is_none());
        assert!(StatusParser::parse("<").is_none());
    }

    #[test]
    fn test_state_only_report() {
        let report = StatusParser::parse("<Alarm>").unwrap();
        assert_eq!(report.state, "Alarm");
        assert!(report.fields.is_empty());
        assert_eq!(report.machine_status(), MachineStatus::new("Alarm", "<Alarm>"));
    }

    #[test]
    fn test_parse_machine_state() {
        assert_eq!(
            StatusParser::parse_machine_state("<Door:1|WPos:0,0,0>"),
            Some("Door:1".to_string())
        );
        assert_eq!(StatusParser::parse_machine_state("Grbl 1.1h"), None);
    }
}
