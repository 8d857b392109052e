//! GRBL protocol support
//!
//! Status report parsing, response classification and machine commands.

pub mod commands;
pub mod response_parser;
pub mod status_parser;

pub use commands::{Axis, Direction, JogCommand, JogStyle, RealtimeCommand, HOME, UNLOCK};
pub use response_parser::{is_accepted, GrblResponse, GrblResponseParser, ACCEPTED_TOKEN};
pub use status_parser::{FeedSpindleState, FieldError, StatusParser, StatusReport};
