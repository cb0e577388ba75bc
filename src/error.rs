//! Error types used across the codec and engine.
//!
//! Every variant's `Display` message doubles as the RESP error payload sent
//! back to the client, so messages are kept short and user-facing.

use thiserror::Error;

/// Errors raised while decoding or encoding RESP values.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot read data")]
    CannotReadData,

    #[error("type mismatch")]
    TypeMismatch,

    #[error("unsupported type")]
    UnsupportedType,

    #[error("number of bytes off")]
    NumberOfBytesOff,

    #[error("max array nesting depth exceeded")]
    RecursionLimitExceeded,

    #[error("cannot serialize simple strings containing \\r or \\n")]
    SimpleStringInvalid,

    #[error("cannot serialize an error with an empty message")]
    EmptyError,

    #[error("cannot serialize unknown value type")]
    UnknownType,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while dispatching or executing an engine command.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported command")]
    UnsupportedCommand,

    #[error("unsupported type")]
    UnsupportedType,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
