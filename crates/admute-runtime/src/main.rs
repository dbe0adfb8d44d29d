//! admute: ad-aware mute daemon and its CLI.
//! One process runs the coordinator, the host channel and the UDS server;
//! the other subcommands are thin JSON-RPC clients.

use clap::Parser;

mod channel;
mod cli;
mod client;
mod cmd_watch;
mod config;
mod coordinator;
mod daemon;
mod fallback;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Run(opts) => {
            let filter = std::env::var("ADMUTE_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("admute daemon starting");
            daemon::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Status(opts) => {
            client::cmd_status(&socket_path, opts.json).await?;
        }
        cli::Command::Watch => {
            cmd_watch::cmd_watch(&socket_path).await?;
        }
        cli::Command::Retry => {
            client::cmd_retry(&socket_path).await?;
        }
        cli::Command::Signal(opts) => {
            client::cmd_signal(&socket_path, &opts).await?;
        }
        cli::Command::Beacon(opts) => {
            client::cmd_beacon(&socket_path, &opts).await?;
        }
        cli::Command::Close(opts) => {
            client::cmd_close(&socket_path, &opts).await?;
        }
    }

    Ok(())
}
