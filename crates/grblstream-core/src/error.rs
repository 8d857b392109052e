//! Error handling for grblstream
//!
//! Provides error types for every layer of the sender:
//! - Connection errors (transport open/read/write)
//! - Stream errors (job usage and protocol failures)
//! - G-Code errors (program loading)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents failures of the serial transport. These are fatal to the
/// current connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Link is not connected
    #[error("Not connected")]
    NotConnected,

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Serial ports could not be enumerated
    #[error("Failed to enumerate ports: {reason}")]
    PortEnumeration {
        /// The reason enumeration failed.
        reason: String,
    },

    /// I/O error on an open transport
    #[error("Serial error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Stream error type
///
/// Usage errors (rejected synchronously) and protocol errors (fatal to the
/// current job only).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Job cannot be started
    #[error("Cannot start: {reason}")]
    CannotStart {
        /// Why the job was refused.
        reason: String,
    },

    /// Another job already owns the link
    #[error("A job is already streaming on this link")]
    AlreadyStreaming,

    /// Controller answered a line without `ok`
    #[error("Line {line_number} rejected ({line}): {response}")]
    Rejected {
        /// 1-based number of the rejected program line.
        line_number: usize,
        /// The program line that was sent.
        line: String,
        /// The controller's response.
        response: String,
    },

    /// The link closed while a line was awaiting its acknowledgement
    #[error("Link closed while line {line_number} was pending")]
    LinkClosed {
        /// 1-based number of the pending program line.
        line_number: usize,
    },
}

/// G-Code error type
///
/// Represents errors while loading a program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GcodeError {
    /// Program contains no sendable lines
    #[error("No valid G-Code lines found")]
    Empty,

    /// File could not be read or decoded
    #[error("File error: {reason}")]
    FileError {
        /// The reason for the file error.
        reason: String,
    },
}

/// Main error type for grblstream
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Stream error
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a stream error
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Error::Stream(_))
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
