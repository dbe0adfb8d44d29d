//! Wire protocol spoken with the audio-control host.
//!
//! Every message is framed as a 4-byte little-endian `u32` length prefix
//! followed by a UTF-8 JSON payload. One command per message; the host
//! answers each command in order, so responses carry no correlation id.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on a single payload (1 MiB).
pub const MAX_MESSAGE_BYTES: u32 = 1024 * 1024;

// ─── Commands & Responses ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostCommand {
    Mute,
    Unmute,
    GetStatus,
}

impl HostCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::GetStatus => "getStatus",
        }
    }

    /// Whether the command changes the desired system mute state.
    pub fn is_state_change(self) -> bool {
        matches!(self, Self::Mute | Self::Unmute)
    }
}

/// Raw response object as sent by the host.
///
/// Success/failure and status replies share one shape:
/// `{"success": true}`, `{"success": false, "error": "..."}` or `{"muted": bool}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

impl HostResponse {
    pub fn ok() -> Self {
        Self {
            success: Some(true),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: Some(false),
            error: Some(error.into()),
            muted: None,
        }
    }

    pub fn status(muted: bool) -> Self {
        Self {
            muted: Some(muted),
            ..Self::default()
        }
    }

    /// Interpret this response as the answer to `command`.
    pub fn outcome_for(&self, command: HostCommand) -> CommandOutcome {
        if self.success == Some(false) {
            let reason = self
                .error
                .clone()
                .unwrap_or_else(|| format!("{} failed", command.as_str()));
            return CommandOutcome::Rejected(reason);
        }
        match command {
            HostCommand::GetStatus => match self.muted {
                Some(muted) => CommandOutcome::Muted(muted),
                None => CommandOutcome::Rejected("status reply without muted field".to_owned()),
            },
            HostCommand::Mute | HostCommand::Unmute => {
                if self.success == Some(true) {
                    CommandOutcome::Done
                } else {
                    CommandOutcome::Rejected(format!(
                        "unexpected reply to {}",
                        command.as_str()
                    ))
                }
            }
        }
    }
}

/// A host response interpreted against the command it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// `getStatus` answered with the current system mute state.
    Muted(bool),
    /// `mute` / `unmute` succeeded.
    Done,
    /// The host ran but reported failure.
    Rejected(String),
}

// ─── Framing ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid length prefix: expected 4 bytes, got {0}")]
    InvalidLengthPrefix(usize),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(u32),

    #[error("Incomplete message: expected {expected} bytes, got {got}")]
    Incomplete { expected: usize, got: usize },

    #[error("Invalid UTF-8 encoding: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("protocol io error: {0}")]
    Io(#[from] io::Error),
}

/// Encode `message` as one length-prefixed frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(message)?;
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    if len > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::MessageTooLarge(len));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Parse a 4-byte prefix into a payload length, enforcing the size bound.
pub fn decode_length(prefix: [u8; 4]) -> Result<usize, ProtocolError> {
    let len = u32::from_le_bytes(prefix);
    if len > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::MessageTooLarge(len));
    }
    Ok(len as usize)
}

/// Decode a payload (without its prefix) into a JSON value.
pub fn decode_payload(payload: &[u8]) -> Result<serde_json::Value, ProtocolError> {
    let text = std::str::from_utf8(payload)?;
    Ok(serde_json::from_str(text)?)
}

/// Read one frame from a blocking reader.
///
/// Returns `Ok(None)` on a clean EOF before any prefix byte.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<serde_json::Value>, ProtocolError> {
    let mut prefix = [0u8; 4];
    let got = read_full(reader, &mut prefix)?;
    if got == 0 {
        return Ok(None);
    }
    if got != prefix.len() {
        return Err(ProtocolError::InvalidLengthPrefix(got));
    }
    let len = decode_length(prefix)?;
    let mut payload = vec![0u8; len];
    let got = read_full(reader, &mut payload)?;
    if got != len {
        return Err(ProtocolError::Incomplete { expected: len, got });
    }
    decode_payload(&payload).map(Some)
}

/// Write one frame to a blocking writer and flush it.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), ProtocolError> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Fill `buf` until it is full or EOF; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
    Ok(filled)
}
