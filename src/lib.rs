//! # grblstream
//!
//! Stream G-code to GRBL controllers over a serial link.
//!
//! ## Architecture
//!
//! grblstream is organized as a workspace with multiple crates:
//!
//! 1. **grblstream-core** - Data model, errors, event sink interface
//! 2. **grblstream-communication** - Serial link, GRBL parsing, G-code streaming
//! 3. **grblstream-settings** - Configuration file
//! 4. **grblstream** - Command-line front end that integrates all crates

pub mod cli;
pub mod console;

pub use grblstream_communication::{
    list_ports, GcodeProgram, GcodeStreamer, JobSnapshot, LinkConfig, RealtimeCommand,
    SerialLink, SerialPortInfo,
};
pub use grblstream_core::{
    ChannelSink, ConnectionError, ConnectionState, Error, EventSink, GcodeError, MachineStatus,
    Position, Progress, Result, RunState, SinkEvent, StreamError,
};
pub use grblstream_settings::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging with:
/// - RUST_LOG environment variable support, `info` by default
/// - Pretty console output, or one JSON object per line when `json` is set
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .json();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
