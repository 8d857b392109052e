//! # grblstream Core
//!
//! Core types, traits, and utilities for grblstream.
//! Provides the data model shared by the serial link and the G-code
//! streamer, the error taxonomy, and the event sink interface.

pub mod core;
pub mod data;
pub mod error;

pub use core::{
    event::{ChannelSink, SinkEvent},
    listener::{ErrorKind, EventSink, NullSink},
};

pub use data::{ConnectionState, MachineStatus, Position, Progress, RunState};

pub use error::{ConnectionError, Error, GcodeError, Result, StreamError};
