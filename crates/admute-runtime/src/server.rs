//! UDS JSON-RPC server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON. `subscribe` keeps the
//! connection open and streams notifications until the client hangs up.

use admute_core::types::SurfaceId;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::broadcast;

use crate::coordinator::CoordinatorHandle;
use crate::fallback::SurfaceMuteDirective;

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

/// What every connection handler needs.
#[derive(Clone)]
pub struct ServerState {
    pub handle: CoordinatorHandle,
    pub directives: broadcast::Sender<SurfaceMuteDirective>,
}

#[derive(Debug, PartialEq)]
pub(crate) struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Run the UDS JSON-RPC server.
pub async fn run_server(socket_path: &str, state: ServerState) -> anyhow::Result<()> {
    // Create socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(stream: tokio::net::UnixStream, state: ServerState) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = match serde_json::from_str(line.trim()) {
        Ok(v) => v,
        Err(e) => {
            let err = RpcError::new(PARSE_ERROR, format!("parse error: {e}"));
            return write_line(&mut writer, &error_response(serde_json::Value::Null, err)).await;
        }
    };
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    if method == "subscribe" {
        return stream_subscription(reader, writer, &state, id).await;
    }

    let response = match dispatch(&state, method, &request["params"]).await {
        Ok(result) => serde_json::json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err(err) => error_response(id, err),
    };
    write_line(&mut writer, &response).await
}

#[derive(Deserialize)]
struct AdPresenceParams {
    surface: String,
    origin: String,
    present: bool,
}

#[derive(Deserialize)]
struct BeaconParams {
    surface: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct SurfaceParams {
    surface: String,
}

/// Handle one unary method.
pub(crate) async fn dispatch(
    state: &ServerState,
    method: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let accepted = serde_json::json!({"accepted": true});
    let gone = |e: crate::coordinator::CoordinatorGone| RpcError::new(INTERNAL_ERROR, e.to_string());

    match method {
        "ad_presence" => {
            let p: AdPresenceParams = parse_params(params)?;
            let surface = surface_id(&p.surface)?;
            if p.origin.is_empty() {
                return Err(RpcError::new(INVALID_PARAMS, "origin must not be empty"));
            }
            state.handle.ad_presence(surface, p.origin, p.present).map_err(gone)?;
            Ok(accepted)
        }
        "beacon" => {
            let p: BeaconParams = parse_params(params)?;
            let surface = surface_id(&p.surface)?;
            state.handle.beacon(surface, p.url).map_err(gone)?;
            Ok(accepted)
        }
        "surface_closed" => {
            let p: SurfaceParams = parse_params(params)?;
            let surface = surface_id(&p.surface)?;
            state.handle.surface_closed(surface).map_err(gone)?;
            Ok(accepted)
        }
        "retry" => {
            state.handle.retry().map_err(gone)?;
            Ok(accepted)
        }
        "status" => {
            let status = state.handle.status().await.map_err(gone)?;
            serde_json::to_value(status).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
        }
        _ => Err(RpcError::new(METHOD_NOT_FOUND, "method not found")),
    }
}

fn parse_params<T: DeserializeOwned>(params: &serde_json::Value) -> Result<T, RpcError> {
    serde_json::from_value(params.clone())
        .map_err(|e| RpcError::new(INVALID_PARAMS, format!("invalid params: {e}")))
}

fn surface_id(raw: &str) -> Result<SurfaceId, RpcError> {
    if raw.is_empty() {
        return Err(RpcError::new(INVALID_PARAMS, "surface must not be empty"));
    }
    Ok(SurfaceId::new(raw))
}

/// Stream `status` and `surface_mute` notifications until the client closes
/// its end or the coordinator stops.
async fn stream_subscription(
    mut reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    state: &ServerState,
    id: serde_json::Value,
) -> anyhow::Result<()> {
    let mut status_rx = state.handle.watch_status();
    let mut directives = state.directives.subscribe();

    let ack = serde_json::json!({
        "jsonrpc": "2.0",
        "result": {"subscribed": true},
        "id": id,
    });
    write_line(&mut writer, &ack).await?;
    let initial = status_rx.borrow_and_update().clone();
    write_line(&mut writer, &notification("status", serde_json::to_value(initial)?)).await?;

    let mut buf = String::new();
    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status_rx.borrow_and_update().clone();
                write_line(&mut writer, &notification("status", serde_json::to_value(snapshot)?)).await?;
            }
            directive = directives.recv() => match directive {
                Ok(d) => {
                    write_line(&mut writer, &notification("surface_mute", serde_json::to_value(d)?)).await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagging; directives dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            read = reader.read_line(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => buf.clear(),
            },
        }
    }
    tracing::debug!("subscriber disconnected");
    Ok(())
}

fn notification(method: &str, params: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

fn error_response(id: serde_json::Value, err: RpcError) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": {"code": err.code, "message": err.message},
        "id": id,
    })
}

async fn write_line(writer: &mut OwnedWriteHalf, value: &serde_json::Value) -> anyhow::Result<()> {
    let mut resp = serde_json::to_string(value)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;
    Ok(())
}
