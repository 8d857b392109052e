//! Program loading and line-by-line streaming

pub mod program;
pub mod streamer;

pub use program::GcodeProgram;
pub use streamer::{GcodeStreamer, JobSnapshot};
