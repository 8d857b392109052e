//! GRBL Response Parser
//!
//! Classifies inbound lines that are not status reports. Only some kinds
//! answer a sent command; the rest are unsolicited push messages.

use super::status_parser::StatusParser;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker that a command was accepted
pub const ACCEPTED_TOKEN: &str = "ok";

/// GRBL response types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrblResponse {
    /// OK acknowledgment
    Ok,
    /// Error response; the code is kept as text
    Error(String),
    /// Alarm push message
    Alarm(String),
    /// Status report `<...>`
    Status,
    /// Bracketed feedback message, e.g. `[MSG:...]`
    Feedback(String),
    /// Startup banner, e.g. `Grbl 1.1h ['$' for help]`
    Welcome(String),
    /// Anything else
    Other(String),
}

impl GrblResponse {
    /// Whether this line is the controller's answer to a sent line
    ///
    /// Alarms, feedback and the startup banner are pushed unsolicited and
    /// never consume a pending command.
    pub fn answers_command(&self) -> bool {
        matches!(
            self,
            GrblResponse::Ok | GrblResponse::Error(_) | GrblResponse::Other(_)
        )
    }
}

impl fmt::Display for GrblResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error(code) => write!(f, "error:{}", code),
            Self::Alarm(code) => write!(f, "ALARM:{}", code),
            Self::Status => write!(f, "status"),
            Self::Feedback(msg) => write!(f, "{}", msg),
            Self::Welcome(banner) => write!(f, "{}", banner),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Check a command response for the accepted-token marker
pub fn is_accepted(response: &str) -> bool {
    response.contains(ACCEPTED_TOKEN)
}

/// GRBL response parser
#[derive(Debug, Default, Clone, Copy)]
pub struct GrblResponseParser;

impl GrblResponseParser {
    /// Create a new GRBL response parser
    pub fn new() -> Self {
        Self
    }

    /// Classify a GRBL line
    pub fn parse(&self, line: &str) -> Option<GrblResponse> {
        let line = line.trim();

        if line.is_empty() {
            return None;
        }

        if line == ACCEPTED_TOKEN {
            return Some(GrblResponse::Ok);
        }

        if let Some(code) = strip_prefix_ignore_case(line, "error:") {
            return Some(GrblResponse::Error(code.trim().to_string()));
        }

        if let Some(code) = strip_prefix_ignore_case(line, "alarm:") {
            return Some(GrblResponse::Alarm(code.trim().to_string()));
        }

        if StatusParser::is_status_report(line) {
            return Some(GrblResponse::Status);
        }

        if line.starts_with('[') && line.ends_with(']') {
            return Some(GrblResponse::Feedback(line.to_string()));
        }

        if line.starts_with("Grbl ") || line.starts_with("GrblHAL ") {
            return Some(GrblResponse::Welcome(line.to_string()));
        }

        Some(GrblResponse::Other(line.to_string()))
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let parser = GrblResponseParser::new();
        assert_eq!(parser.parse("ok"), Some(GrblResponse::Ok));
        assert_eq!(parser.parse(" ok \r"), Some(GrblResponse::Ok));
        assert_eq!(parser.parse("error:20"), Some(GrblResponse::Error("20".into())));
        assert_eq!(parser.parse("ALARM:1"), Some(GrblResponse::Alarm("1".into())));
        assert_eq!(parser.parse("alarm:6"), Some(GrblResponse::Alarm("6".into())));
        assert_eq!(parser.parse("<Idle|WPos:0,0,0>"), Some(GrblResponse::Status));
        assert!(matches!(
            parser.parse("[MSG:'$H'|'$X' to unlock]"),
            Some(GrblResponse::Feedback(_))
        ));
        assert!(matches!(
            parser.parse("Grbl 1.1h ['$' for help]"),
            Some(GrblResponse::Welcome(_))
        ));
        assert!(matches!(parser.parse("X+ done"), Some(GrblResponse::Other(_))));
        assert_eq!(parser.parse(""), None);
    }

    #[test]
    fn test_answers_command() {
        assert!(GrblResponse::Ok.answers_command());
        assert!(GrblResponse::Error("1".into()).answers_command());
        assert!(GrblResponse::Other("moved".into()).answers_command());
        assert!(!GrblResponse::Alarm("1".into()).answers_command());
        assert!(!GrblResponse::Feedback("[MSG:x]".into()).answers_command());
        assert!(!GrblResponse::Welcome("Grbl 1.1h".into()).answers_command());
        assert!(!GrblResponse::Status.answers_command());
    }

    #[test]
    fn test_is_accepted_uses_substring() {
        assert!(is_accepted("ok"));
        assert!(is_accepted("X+ ok"));
        assert!(!is_accepted("error:20"));
        assert!(!is_accepted("Sent"));
    }
}
