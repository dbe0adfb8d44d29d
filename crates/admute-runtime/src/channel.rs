//! Host channel: spawn the audio host, probe it, then pump framed commands
//! and responses between it and the coordinator.

use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use admute_core::protocol::{self, HostCommand, HostResponse, ProtocolError};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::coordinator::CoordinatorEvent;

/// Identifies one opened channel. Events carrying an older id are stale.
pub type LinkId = u64;

/// How long `close` waits for queued commands to be written.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to spawn host {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host command line is empty")]
    NoCommand,

    #[error("host {0} pipe unavailable")]
    MissingPipe(&'static str),

    #[error("host handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("host handshake failed: {0}")]
    Handshake(String),

    #[error("host closed the channel")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ─── Connector ───────────────────────────────────────────────────

/// Opens host channels. Responses and closure of the returned link are
/// reported on `events` tagged with `link_id`.
pub trait HostConnector: Send + Sync + 'static {
    fn open(
        &self,
        link_id: LinkId,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
    ) -> impl Future<Output = Result<HostLink, ChannelError>> + Send;
}

/// Spawns the host executable with piped stdio.
pub struct ProcessConnector {
    command: Vec<String>,
    handshake_timeout: Duration,
}

impl ProcessConnector {
    pub fn new(command: Vec<String>, handshake_timeout: Duration) -> Self {
        Self {
            command,
            handshake_timeout,
        }
    }
}

impl HostConnector for ProcessConnector {
    fn open(
        &self,
        link_id: LinkId,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
    ) -> impl Future<Output = Result<HostLink, ChannelError>> + Send {
        let command = self.command.clone();
        let handshake_timeout = self.handshake_timeout;
        async move { spawn_host(&command, handshake_timeout, link_id, events).await }
    }
}

async fn spawn_host(
    command: &[String],
    handshake_timeout: Duration,
    link_id: LinkId,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
) -> Result<HostLink, ChannelError> {
    let (program, args) = command.split_first().ok_or(ChannelError::NoCommand)?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ChannelError::Spawn {
            program: program.clone(),
            source,
        })?;

    let mut stdin = child.stdin.take().ok_or(ChannelError::MissingPipe("stdin"))?;
    let mut stdout = child.stdout.take().ok_or(ChannelError::MissingPipe("stdout"))?;

    let reply = tokio::time::timeout(handshake_timeout, probe(&mut stdin, &mut stdout))
        .await
        .map_err(|_| ChannelError::HandshakeTimeout(handshake_timeout))??;
    tracing::info!(
        link_id,
        program = %program,
        muted = ?reply.muted,
        "host channel open"
    );

    Ok(HostLink::spawn(link_id, stdin, stdout, Some(child), events))
}

/// Send a `getStatus` and wait for any well-formed reply.
async fn probe<W, R>(writer: &mut W, reader: &mut R) -> Result<HostResponse, ChannelError>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    write_frame_async(writer, &HostCommand::GetStatus).await?;
    let value = read_frame_async(reader).await?.ok_or(ChannelError::Closed)?;
    let response: HostResponse =
        serde_json::from_value(value).map_err(|e| ChannelError::Handshake(e.to_string()))?;
    if response.muted.is_none() && response.success.is_none() {
        return Err(ChannelError::Handshake("empty probe reply".to_string()));
    }
    Ok(response)
}

// ─── Link ────────────────────────────────────────────────────────

/// A live channel: a writer task fed by `send`, a reader task posting
/// responses, and the host process (killed on drop).
pub struct HostLink {
    id: LinkId,
    commands: Option<mpsc::UnboundedSender<HostCommand>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    _child: Option<Child>,
}

impl HostLink {
    pub fn spawn<W, R>(
        id: LinkId,
        writer: W,
        reader: R,
        child: Option<Child>,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(id, writer, rx, events.clone()));
        let reader = tokio::spawn(read_loop(id, reader, events));
        Self {
            id,
            commands: Some(tx),
            writer: Some(writer),
            reader: Some(reader),
            _child: child,
        }
    }

    /// A link whose commands land on `commands` with no IO behind it.
    #[cfg(test)]
    pub(crate) fn detached(id: LinkId, commands: mpsc::UnboundedSender<HostCommand>) -> Self {
        Self {
            id,
            commands: Some(commands),
            writer: None,
            reader: None,
            _child: None,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Queue `command` for the writer task.
    pub fn send(&self, command: HostCommand) -> Result<(), ChannelError> {
        let commands = self.commands.as_ref().ok_or(ChannelError::Closed)?;
        commands.send(command).map_err(|_| ChannelError::Closed)
    }

    /// Stop accepting commands and give the writer a moment to drain.
    pub async fn close(mut self) {
        self.commands.take();
        if let Some(writer) = self.writer.as_mut() {
            let _ = tokio::time::timeout(CLOSE_GRACE, writer).await;
        }
    }
}

impl Drop for HostLink {
    fn drop(&mut self) {
        for task in [self.writer.take(), self.reader.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

impl fmt::Debug for HostLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLink")
            .field("id", &self.id)
            .field("open", &self.commands.is_some())
            .finish()
    }
}

async fn write_loop<W>(
    link_id: LinkId,
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<HostCommand>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        tracing::debug!(link_id, command = command.as_str(), "writing host command");
        if let Err(e) = write_frame_async(&mut writer, &command).await {
            let _ = events.send(CoordinatorEvent::HostClosed {
                link_id,
                reason: format!("write failed: {e}"),
            });
            return;
        }
    }
}

async fn read_loop<R>(link_id: LinkId, mut reader: R, events: mpsc::UnboundedSender<CoordinatorEvent>)
where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        match read_frame_async(&mut reader).await {
            Ok(Some(value)) => match serde_json::from_value::<HostResponse>(value) {
                Ok(response) => {
                    if events
                        .send(CoordinatorEvent::HostResponse { link_id, response })
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => break format!("undecodable host response: {e}"),
            },
            Ok(None) => break "host closed its output".to_string(),
            Err(e) => break format!("read failed: {e}"),
        }
    };
    tracing::warn!(link_id, %reason, "host channel lost");
    let _ = events.send(CoordinatorEvent::HostClosed { link_id, reason });
}

// ─── Async framing ───────────────────────────────────────────────

/// Read one frame; `Ok(None)` on EOF before a complete prefix.
pub async fn read_frame_async<R>(reader: &mut R) -> Result<Option<serde_json::Value>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = protocol::decode_length(prefix)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    protocol::decode_payload(&payload).map(Some)
}

pub async fn write_frame_async<W, T>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = protocol::encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
