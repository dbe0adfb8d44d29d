//! Daemon wiring: coordinator task + UDS server, torn down on ctrl-c/SIGTERM.

use crate::channel::ProcessConnector;
use crate::cli::RunOpts;
use crate::config::CoordinatorConfig;
use crate::coordinator::Coordinator;
use crate::fallback::BroadcastMuter;
use crate::server::{self, ServerState};

const DIRECTIVE_CAPACITY: usize = 64;

/// Run the daemon: starts the coordinator and UDS server, waits for a
/// shutdown signal, then releases every mute before exiting.
pub async fn run_daemon(opts: RunOpts, socket_path: &str) -> anyhow::Result<()> {
    let config = CoordinatorConfig::from_opts(&opts)?;
    tracing::info!(
        host = %config.host_command.join(" "),
        beacon_hosts = config.beacon_filter.hosts().len(),
        "configuration loaded"
    );

    let muter = BroadcastMuter::new(DIRECTIVE_CAPACITY);
    let directives = muter.sender();
    let connector = ProcessConnector::new(config.host_command.clone(), config.handshake_timeout);
    let (coordinator, handle) = Coordinator::new(&config, connector, muter);

    let mut coordinator_handle = tokio::spawn(coordinator.run());

    // Start UDS server
    let server_state = ServerState {
        handle: handle.clone(),
        directives,
    };
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_state).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    tokio::select! {
        res = shutdown_signal() => res?,
        _ = &mut coordinator_handle => {
            tracing::warn!("coordinator exited unexpectedly");
        }
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    handle.shutdown();
    if !coordinator_handle.is_finished() {
        let _ = coordinator_handle.await;
    }

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("received ctrl-c, shutting down");
    }

    Ok(())
}
