//! Event interfaces shared by the link and the streamer

pub mod event;
pub mod listener;

pub use event::{ChannelSink, SinkEvent};
pub use listener::{ErrorKind, EventSink, NullSink};
