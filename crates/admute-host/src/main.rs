//! admute-host: audio-control process spawned by the admute runtime (or a
//! browser's native messaging launcher). stdout carries the protocol, so
//! logs only go to stderr and only when ADMUTE_HOST_LOG is set.

use std::time::Duration;

use admute_host::{Backend, SystemRunner, controller_for, run_host};
use clap::Parser;

#[derive(Parser)]
#[command(name = "admute-host", about = "Native messaging host for system audio mute")]
struct Cli {
    /// Mixer backend
    #[arg(long, value_enum, default_value = "auto", env = "ADMUTE_HOST_BACKEND")]
    backend: Backend,

    /// Per-command timeout in milliseconds
    #[arg(long, default_value = "5000")]
    command_timeout_ms: u64,

    /// Browser launchers append the caller origin; accepted and ignored.
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    _launcher_args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Ok(filter) = std::env::var("ADMUTE_HOST_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
    }

    let runner = SystemRunner::new(Duration::from_millis(cli.command_timeout_ms));
    let controller = controller_for(cli.backend, runner);

    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    run_host(stdin, stdout, controller.as_ref())?;
    Ok(())
}
