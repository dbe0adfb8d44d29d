//! Error types for the audio host.

use admute_core::protocol::ProtocolError;
use thiserror::Error;

/// Display strings double as the `error` field sent back to the client.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0}")]
    CommandFailed(String),

    #[error("Command timed out")]
    Timeout,

    #[error("{0} not found")]
    NotFound(String),

    #[error("unexpected {program} output: {output}")]
    UnexpectedOutput { program: String, output: String },

    #[error("host io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
