//! # grblstream communication
//!
//! Serial link management, GRBL line parsing and G-code streaming.
//!
//! A [`SerialLink`] owns the connection and its reader thread; a
//! [`GcodeStreamer`] sends a [`GcodeProgram`] over it one acknowledged line
//! at a time. Both report through a shared [`grblstream_core::EventSink`].

pub mod communication;
pub mod firmware;
pub mod streaming;

pub use communication::{
    auto_select_port, list_ports, CommandLink, LinkConfig, PortOpener, ResponseOutcome,
    SerialLink, SerialPortInfo, SystemPortOpener, Transport,
};
pub use firmware::grbl::{
    GrblResponse, GrblResponseParser, JogCommand, JogStyle, RealtimeCommand, StatusParser,
    StatusReport,
};
pub use streaming::{GcodeProgram, GcodeStreamer, JobSnapshot};
