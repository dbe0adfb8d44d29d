//! Native messaging loop: read a framed command, run it, write the framed reply.

use std::io::{Read, Write};

use admute_core::protocol::{self, HostResponse, ProtocolError};
use serde_json::Value;

use crate::controller::AudioController;
use crate::error::HostError;

/// Turn one decoded message into its response. Never fails: every problem
/// becomes a `{success: false, error}` reply.
pub fn process_message(message: &Value, controller: &dyn AudioController) -> HostResponse {
    let Some(object) = message.as_object() else {
        tracing::debug!("message is not an object");
        return HostResponse::failure("Invalid message format");
    };

    let command = match object.get("command") {
        None => return HostResponse::failure("No command specified"),
        Some(value) if is_blank(value) => return HostResponse::failure("No command specified"),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    tracing::debug!(%command, "processing command");
    match command.as_str() {
        "mute" => match controller.set_muted(true) {
            Ok(()) => HostResponse::ok(),
            Err(e) => failure(e, "Failed to mute"),
        },
        "unmute" => match controller.set_muted(false) {
            Ok(()) => HostResponse::ok(),
            Err(e) => failure(e, "Failed to unmute"),
        },
        "getStatus" => match controller.is_muted() {
            Ok(muted) => HostResponse::status(muted),
            Err(e) => failure(e, "Failed to get status"),
        },
        other => HostResponse::failure(format!("Unknown command: {other}")),
    }
}

/// Empty-ish JSON values: null, false, zero, and empty strings, arrays or objects.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn failure(err: HostError, fallback: &str) -> HostResponse {
    tracing::warn!(error = %err, "audio command failed");
    let reason = err.to_string();
    if reason.is_empty() {
        HostResponse::failure(fallback)
    } else {
        HostResponse::failure(reason)
    }
}

/// Serve frames until the reader hits EOF.
///
/// Malformed frames are answered with an error and the loop continues; only
/// an I/O failure on either stream ends it with an error.
pub fn run_host<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    controller: &dyn AudioController,
) -> Result<(), HostError> {
    tracing::info!("audio host started");
    loop {
        let response = match protocol::read_frame(&mut reader) {
            Ok(Some(message)) => process_message(&message, controller),
            Ok(None) => {
                tracing::info!("end of input, exiting");
                return Ok(());
            }
            Err(ProtocolError::Io(e)) => return Err(HostError::Io(e)),
            Err(e) => {
                tracing::warn!(error = %e, "message read error");
                HostResponse::failure(e.to_string())
            }
        };
        protocol::write_frame(&mut writer, &response)?;
    }
}
