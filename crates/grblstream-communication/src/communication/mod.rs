//! Communication layer
//!
//! Serial transport, the [`SerialLink`] connection manager and the
//! [`CommandLink`] seam the streamer drives it through.

pub mod exchange;
pub mod link;
pub mod serial;

pub use exchange::{ResponseOutcome, ResponseSlot};
pub use link::{LinkConfig, SerialLink};
pub use serial::{
    auto_select_port, list_ports, PortOpener, RealSerialPort, SerialPortInfo, SystemPortOpener,
    Transport,
};

use grblstream_core::ConnectionError;

/// The operations a streaming job needs from a link
///
/// A job claims the link for its lifetime. Each line is sent only after the
/// slot is armed, and the job blocks in [`CommandLink::wait_response`] until
/// the answer arrives, the link closes or the wait is cancelled.
pub trait CommandLink: Send + Sync {
    /// Whether lines can be sent right now
    fn is_connected(&self) -> bool;

    /// Write one line; the terminator is appended
    fn send_line(&self, line: &str) -> Result<(), ConnectionError>;

    /// Take exclusive streaming rights. Returns false if already claimed.
    fn claim_stream(&self) -> bool;

    /// Give streaming rights back
    fn release_stream(&self);

    /// Arm the response slot ahead of a send
    fn expect_response(&self);

    /// Block until the armed response resolves
    fn wait_response(&self) -> ResponseOutcome;

    /// Abort a pending or upcoming wait
    fn cancel_response(&self);
}
