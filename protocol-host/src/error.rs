//! The three error kinds from spec §7, plus the `EF EF EF` endpoint signal.

use std::io;

/// Everything that can abort a [`crate::Session::send`] call.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The port could not be opened, read, or written at the OS level.
    #[error("serial io error: {0}")]
    Io(#[from] io::Error),

    /// An expected byte count did not arrive within the current phase's window.
    #[error("timed out waiting for {phase}")]
    Timeout { phase: &'static str },

    /// Received bytes do not conform to the wire contract: wrong marker, wrong
    /// ACK code, echo mismatch, or any other structural violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The firmware emitted `EF EF EF`, abandoning the current frame.
    #[error("firmware reported a framing/checksum error (EF EF EF)")]
    Endpoint,
}

impl From<protocol::FrameError> for SessionError {
    fn from(err: protocol::FrameError) -> Self {
        SessionError::Protocol(err.to_string())
    }
}
