//! UDS JSON-RPC client for CLI subcommands.

use admute_core::status::{StatusSnapshot, format_status_line};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::cli::{BeaconOpts, CloseOpts, SignalOpts};

async fn connect(socket_path: &str) -> anyhow::Result<UnixStream> {
    UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))
}

fn request_line(method: &str, params: serde_json::Value) -> anyhow::Result<String> {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    Ok(req)
}

pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();

    writer.write_all(request_line(method, params)?.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

/// An open `subscribe` stream. Dropping it closes the connection, which is
/// how the server learns the subscriber left.
pub(crate) struct Subscription {
    reader: BufReader<OwnedReadHalf>,
    _writer: OwnedWriteHalf,
}

impl Subscription {
    /// Next notification, or `None` once the daemon closes the stream.
    pub(crate) async fn next(&mut self) -> anyhow::Result<Option<serde_json::Value>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(line.trim())?))
    }
}

/// Open a subscription. The write half stays open for the lifetime of the
/// stream; a half-closed socket reads as a departed subscriber.
pub(crate) async fn rpc_subscribe(socket_path: &str) -> anyhow::Result<Subscription> {
    let stream = connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    writer
        .write_all(request_line("subscribe", serde_json::json!({}))?.as_bytes())
        .await?;

    let mut sub = Subscription {
        reader: BufReader::new(reader),
        _writer: writer,
    };
    let ack = sub
        .next()
        .await?
        .ok_or_else(|| anyhow::anyhow!("daemon closed the subscription"))?;
    if let Some(error) = ack.get("error") {
        anyhow::bail!("RPC error: {error}");
    }
    Ok(sub)
}

/// `admute status`
pub async fn cmd_status(socket_path: &str, json: bool) -> anyhow::Result<()> {
    let result = rpc_call(socket_path, "status", serde_json::json!({})).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    let status: StatusSnapshot = serde_json::from_value(result)?;
    println!("{}", format_status_line(&status));
    Ok(())
}

/// `admute retry`
pub async fn cmd_retry(socket_path: &str) -> anyhow::Result<()> {
    rpc_call(socket_path, "retry", serde_json::json!({})).await?;
    println!("retry requested");
    Ok(())
}

/// `admute signal`
pub async fn cmd_signal(socket_path: &str, opts: &SignalOpts) -> anyhow::Result<()> {
    rpc_call(socket_path, "ad_presence", signal_params(opts)).await?;
    Ok(())
}

/// `admute beacon`
pub async fn cmd_beacon(socket_path: &str, opts: &BeaconOpts) -> anyhow::Result<()> {
    let params = serde_json::json!({"surface": opts.surface, "url": opts.url});
    rpc_call(socket_path, "beacon", params).await?;
    Ok(())
}

/// `admute close`
pub async fn cmd_close(socket_path: &str, opts: &CloseOpts) -> anyhow::Result<()> {
    let params = serde_json::json!({"surface": opts.surface});
    rpc_call(socket_path, "surface_closed", params).await?;
    Ok(())
}

fn signal_params(opts: &SignalOpts) -> serde_json::Value {
    serde_json::json!({
        "surface": opts.surface,
        "origin": opts.origin,
        "present": opts.present && !opts.absent,
    })
}
