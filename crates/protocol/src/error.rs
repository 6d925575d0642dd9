use thiserror::Error;

use crate::frame::MessageType;

/// Errors produced while decoding a wire frame.
///
/// Codec errors describe a malformed buffer. Well-formed frames carrying
/// semantically bad content (an out-of-bounds move, an expired token) are
/// not codec errors; those surface from the handler that interprets them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too short: need {need} bytes, have {have}")]
    ShortBuffer { need: usize, have: usize },

    #[error("wrong message type: expected {expected:#04x}, got {actual:#04x}")]
    WrongType { expected: u8, actual: u8 },

    #[error("length field mismatch: header says {expected}, buffer holds {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("malformed payload: {0}")]
    PayloadMalformed(String),

    #[error("HAS_ID flag not set, frame carries no request id")]
    MissingId,
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Errors surfaced by frame dispatch and message handlers.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("unknown message type: {0:#04x}")]
    UnknownType(u8),

    #[error("no handler registered for message type {0:?}")]
    NoHandler(MessageType),

    #[error("handler failed: {0}")]
    Handler(String),
}

/// Result type for handler and dispatch operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Errors returned by [`ConnectionController::send`](crate::ConnectionController::send).
///
/// `send` never blocks and never silently drops: a full queue or a downed
/// peer is reported to the caller, which decides whether to retry, skip
/// the recipient or tear the session down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("send queue full")]
    QueueFull,

    #[error("not connected")]
    NotConnected,
}

/// Terminal errors from the connection controller's run loop.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("controller has no connection to drive")]
    NotConnected,

    #[error("controller is already connected")]
    AlreadyConnected,

    #[error("controller run loop is already active")]
    AlreadyRunning,

    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectFailed { attempts: u32 },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
