//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while building, encoding or decoding packets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("too many arguments: {count} (max {max})")]
    TooManyArguments { count: usize, max: usize },

    #[error("truncated input: need {needed} more bytes")]
    Truncated { needed: usize },

    #[error("unknown argument type tag: {0:#x}")]
    UnknownArgType(u8),

    #[error("unknown game message type: {0}")]
    UnknownMessageType(u32),

    #[error("unexpected game message type: expected {expected}, got {actual}")]
    UnexpectedMessageType { expected: u32, actual: u32 },

    #[error("extended data too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("{0} trailing bytes after last argument")]
    TrailingBytes(usize),
}

impl ProtocolError {
    /// Returns whether this error means the input ended early.
    ///
    /// Datagram transports never deliver partial packets, so callers treat
    /// this the same as any other malformed input.
    pub fn is_truncation(&self) -> bool {
        matches!(self, ProtocolError::Truncated { .. })
    }
}
