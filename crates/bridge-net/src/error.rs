//! Error taxonomy for the session client.

use std::time::Duration;

/// Bad user input. Never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Velocity was negative or out of range.
    #[error("velocity must be a non-negative integer, got {0}")]
    Velocity(i64),
    /// Wait time was negative or out of range.
    #[error("wait time must be a non-negative integer, got {0}")]
    WaitTime(i64),
    /// A textual field did not parse as an integer.
    #[error("{field} must be a non-negative integer, got {input:?}")]
    NotAnInteger {
        /// Which field was being parsed.
        field: &'static str,
        /// The raw text supplied.
        input: String,
    },
    /// Direction was not one of the two path directions.
    #[error("invalid direction {0:?}, expected EAST_TO_WEST or WEST_TO_EAST")]
    Direction(String),
}

/// Opening the socket or sending the handshake failed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Name resolution or TCP connect failed.
    #[error("connection to {addr} failed: {source}")]
    Connect {
        /// `host:port` that was dialed.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// TCP connect did not complete in time.
    #[error("connection to {addr} timed out after {timeout:?}")]
    Timeout {
        /// `host:port` that was dialed.
        addr: String,
        /// Configured connect timeout.
        timeout: Duration,
    },
    /// The handshake could not be written.
    #[error("handshake send failed: {0}")]
    Handshake(#[source] std::io::Error),
    /// The handshake could not be serialized.
    #[error("handshake encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A single inbound line could not be decoded. The stream continues.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The line is not valid JSON or does not match any message shape.
    #[error("malformed message {line:?}: {source}")]
    Malformed {
        /// The offending raw line.
        line: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The line is not valid UTF-8.
    #[error("message is not valid UTF-8: {line:?}")]
    InvalidUtf8 {
        /// Lossy rendering of the raw line.
        line: String,
    },
    /// No newline arrived before the carry-over buffer hit its cap.
    #[error("partial line of {len} bytes exceeds maximum {max}, discarded")]
    LineTooLong {
        /// Bytes discarded.
        len: usize,
        /// Configured cap.
        max: usize,
    },
}

/// Why a session worker stopped reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionFault {
    /// The peer closed the stream (zero-length read).
    #[error("peer closed the connection")]
    PeerClosed,
    /// The peer reset the connection.
    #[error("connection reset by peer")]
    Reset,
    /// Any other read error.
    #[error("I/O error: {0}")]
    Io(String),
    /// Local stop: explicit end of session, simulated drop or shutdown.
    #[error("stopped locally")]
    Stopped,
}

impl SessionFault {
    pub(crate) fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => SessionFault::Reset,
            ErrorKind::UnexpectedEof => SessionFault::PeerClosed,
            _ => SessionFault::Io(err.to_string()),
        }
    }
}

/// Errors returned by the command entry points of
/// [`SessionClient`](crate::SessionClient).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Input rejected before any I/O.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Could not establish the connection.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// The command needs an active connection.
    #[error("not connected")]
    NotConnected,
    /// Writing a command to the socket failed.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
    /// A command could not be serialized.
    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// Automatic reconnection gave up; the session identity was dropped.
    #[error("reconnection failed after {attempts} attempts")]
    RetryExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}
