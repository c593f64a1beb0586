//! Error types for the insteon-plm library.

use thiserror::Error;

use crate::types::InsteonMessage;

/// The main error type for modem operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The modem answered a frame with NAK.
    #[error("command not acknowledged (command=0x{command:02x})")]
    CommandNotAcknowledged { command: u8 },

    /// A device answered a message with NAK, or did not acknowledge it.
    #[error("message not acknowledged (to={}, cmd1=0x{:02x}, cmd2=0x{:02x})", .reply.from, .reply.cmd1, .reply.cmd2)]
    MessageNotAcknowledged { reply: Box<InsteonMessage> },

    /// A correlated wait matched a message of the wrong kind.
    #[error("unexpected message (from={}, cmd1=0x{:02x}, cmd2=0x{:02x})", .message.from, .message.cmd1, .message.cmd2)]
    UnexpectedMessage { message: Box<InsteonMessage> },

    /// Timed out waiting for a reply.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A caller supplied an invalid argument.
    #[error("invalid argument: {reason}")]
    Validation { reason: String },

    /// A reply frame did not carry the payload its command requires.
    #[error("unexpected payload in reply to command 0x{command:02x}")]
    UnexpectedPayload { command: u8 },

    /// The modem link is not open.
    #[error("not connected")]
    NotConnected,

    /// An internal event channel was closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl Error {
    /// Returns the kind of this error, used by retry policies.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Serial(_) | Self::Io(_) => ErrorKind::Io,
            Self::Frame(_) => ErrorKind::MalformedFrame,
            Self::CommandNotAcknowledged { .. } => ErrorKind::CommandNotAcknowledged,
            Self::MessageNotAcknowledged { .. } => ErrorKind::MessageNotAcknowledged,
            Self::UnexpectedMessage { .. } => ErrorKind::UnexpectedMessage,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::UnexpectedPayload { .. } => ErrorKind::UnexpectedPayload,
            Self::NotConnected | Self::ChannelClosed => ErrorKind::NotConnected,
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Serial or I/O failure.
    Io,
    /// Malformed frame data.
    MalformedFrame,
    /// Frame-level NAK from the modem.
    CommandNotAcknowledged,
    /// Message-level NAK from a device.
    MessageNotAcknowledged,
    /// A correlated message of the wrong kind.
    UnexpectedMessage,
    /// Deadline expired.
    Timeout,
    /// Invalid caller input.
    Validation,
    /// Reply carried the wrong payload shape.
    UnexpectedPayload,
    /// Link closed.
    NotConnected,
}

/// Frame-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The buffer ran out before the frame was complete.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// A fixed-length block had the wrong size.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    /// A byte where the ACK/NAK terminator was required held something else.
    #[error("missing terminator: found 0x{found:02x}")]
    MissingTerminator { found: u8 },

    /// A field held a value outside its domain.
    #[error("invalid {field}: 0x{value:02x}")]
    InvalidValue { field: &'static str, value: u8 },
}

impl FrameError {
    /// Returns true if more input may complete the frame.
    #[must_use]
    pub const fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete)
    }
}

/// Invalid device address text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address {input:?}: expected 6 hex characters, e.g. ffffff")]
pub struct AddressError {
    pub(crate) input: String,
}

impl From<AddressError> for Error {
    fn from(e: AddressError) -> Self {
        Self::validation(e.to_string())
    }
}

/// Result type alias for modem operations.
pub type Result<T> = std::result::Result<T, Error>;
