//! CLI definition using clap derive.

use clap::{ArgGroup, Parser, Subcommand};

use admute_core::ad_window::{
    DEFAULT_CONFIRM_WINDOW_MS, DEFAULT_SILENCE_TIMEOUT_MS, DEFAULT_THRESHOLD,
};
use admute_core::arbitration::DEFAULT_MAX_FAILED_OPERATIONS;
use admute_core::backoff::{DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS};

#[derive(Parser)]
#[command(name = "admute", about = "Mute system audio while ads play")]
pub struct Cli {
    /// UDS socket path (default: /tmp/admute-$USER/admuted.sock)
    #[arg(long, short = 's', global = true, env = "ADMUTE_SOCKET")]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (coordinator + UDS server)
    Run(RunOpts),
    /// Show connection and mute status
    Status(StatusOpts),
    /// Stream status and per-surface mute directives
    Watch,
    /// Reset reconnect attempts and leave degraded mode
    Retry,
    /// Report an ad-present / ad-absent level signal for a surface
    Signal(SignalOpts),
    /// Report a network beacon observed on a surface
    Beacon(BeaconOpts),
    /// Report that a surface went away
    Close(CloseOpts),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunOpts {
    /// Host command line (program and arguments, whitespace separated)
    #[arg(long, env = "ADMUTE_HOST_COMMAND", default_value = "admute-host")]
    pub host_command: String,

    /// First reconnect delay in milliseconds
    #[arg(long, env = "ADMUTE_INITIAL_DELAY_MS", default_value_t = DEFAULT_INITIAL_DELAY_MS)]
    pub initial_delay_ms: u64,

    /// Reconnect delay cap in milliseconds
    #[arg(long, env = "ADMUTE_MAX_DELAY_MS", default_value_t = DEFAULT_MAX_DELAY_MS)]
    pub max_delay_ms: u64,

    /// Automatic reconnect attempts before giving up
    #[arg(long, env = "ADMUTE_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Consecutive host command failures before degraded mode
    #[arg(long, env = "ADMUTE_MAX_FAILED_OPERATIONS", default_value_t = DEFAULT_MAX_FAILED_OPERATIONS)]
    pub max_failed_operations: u32,

    /// Beacons needed to confirm an ad break
    #[arg(long, env = "ADMUTE_AD_THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    pub ad_threshold: u32,

    /// Confirmation window in milliseconds
    #[arg(long, env = "ADMUTE_CONFIRM_WINDOW_MS", default_value_t = DEFAULT_CONFIRM_WINDOW_MS)]
    pub confirm_window_ms: u64,

    /// Beacon silence that ends an ad break, in milliseconds
    #[arg(long, env = "ADMUTE_SILENCE_TIMEOUT_MS", default_value_t = DEFAULT_SILENCE_TIMEOUT_MS)]
    pub silence_timeout_ms: u64,

    /// Beacon host allowlist entry (repeatable; replaces the built-in list)
    #[arg(long = "beacon-host", env = "ADMUTE_BEACON_HOSTS", value_delimiter = ',')]
    pub beacon_hosts: Vec<String>,

    /// Host handshake timeout in milliseconds
    #[arg(long, env = "ADMUTE_HANDSHAKE_TIMEOUT_MS", default_value = "5000")]
    pub handshake_timeout_ms: u64,
}

#[derive(clap::Args, Default)]
pub struct StatusOpts {
    /// Print the raw status object as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
#[command(group(ArgGroup::new("presence").required(true).args(["present", "absent"])))]
pub struct SignalOpts {
    /// Surface id (e.g. a tab id)
    pub surface: String,

    /// Detection method reporting the signal (e.g. "player-overlay")
    pub origin: String,

    /// An ad is showing
    #[arg(long)]
    pub present: bool,

    /// No ad is showing
    #[arg(long)]
    pub absent: bool,
}

#[derive(clap::Args)]
pub struct BeaconOpts {
    /// Surface id the request was observed on
    pub surface: String,

    /// Request URL; omit when the caller already filtered it
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(clap::Args)]
pub struct CloseOpts {
    /// Surface id
    pub surface: String,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/admute/admuted.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/admute-{user}/admuted.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["admute", "run"]).expect("parse");
        let Command::Run(opts) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(opts.host_command, "admute-host");
        assert_eq!(opts.initial_delay_ms, 1_000);
        assert_eq!(opts.max_delay_ms, 30_000);
        assert_eq!(opts.max_attempts, 5);
        assert_eq!(opts.max_failed_operations, 3);
        assert_eq!(opts.ad_threshold, 2);
        assert_eq!(opts.confirm_window_ms, 3_000);
        assert_eq!(opts.silence_timeout_ms, 8_000);
    }

    #[test]
    fn beacon_hosts_accept_commas_and_repeats() {
        let cli = Cli::try_parse_from([
            "admute",
            "run",
            "--beacon-host",
            "a.example,b.example",
            "--beacon-host",
            "c.example",
        ])
        .expect("parse");
        let Command::Run(opts) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(opts.beacon_hosts, vec!["a.example", "b.example", "c.example"]);
    }

    #[test]
    fn signal_requires_exactly_one_presence_flag() {
        assert!(Cli::try_parse_from(["admute", "signal", "tab1", "overlay"]).is_err());
        assert!(
            Cli::try_parse_from(["admute", "signal", "tab1", "overlay", "--present", "--absent"])
                .is_err()
        );
        let cli = Cli::try_parse_from(["admute", "signal", "tab1", "overlay", "--absent"])
            .expect("parse");
        let Command::Signal(opts) = cli.command else {
            panic!("expected signal");
        };
        assert!(opts.absent && !opts.present);
    }

    #[test]
    fn global_socket_path_after_subcommand() {
        let cli = Cli::try_parse_from(["admute", "status", "--json", "-s", "/tmp/x.sock"])
            .expect("parse");
        assert_eq!(cli.socket_path.as_deref(), Some("/tmp/x.sock"));
    }
}
