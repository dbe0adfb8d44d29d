//! Daemon configuration: CLI flags (with env fallbacks) mapped into policy
//! structs and validated before anything starts.

use std::time::Duration;

use admute_core::ad_window::AdWindowPolicy;
use admute_core::arbitration::ArbitrationPolicy;
use admute_core::backoff::ReconnectPolicy;
use admute_core::signal::BeaconFilter;
use thiserror::Error;

use crate::cli::RunOpts;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host command is empty")]
    EmptyHostCommand,

    #[error("ad threshold must be at least 1")]
    ZeroThreshold,

    #[error("silence timeout must be non-zero")]
    ZeroSilenceTimeout,

    #[error("initial reconnect delay ({initial_ms} ms) exceeds the maximum ({max_ms} ms)")]
    DelayOrder { initial_ms: u64, max_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Host program followed by its arguments.
    pub host_command: Vec<String>,
    pub reconnect: ReconnectPolicy,
    pub arbitration: ArbitrationPolicy,
    pub ad_window: AdWindowPolicy,
    pub beacon_filter: BeaconFilter,
    pub handshake_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host_command: vec!["admute-host".to_string()],
            reconnect: ReconnectPolicy::default(),
            arbitration: ArbitrationPolicy::default(),
            ad_window: AdWindowPolicy::default(),
            beacon_filter: BeaconFilter::default(),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_opts(opts: &RunOpts) -> Result<Self, ConfigError> {
        let beacon_filter = if opts.beacon_hosts.is_empty() {
            BeaconFilter::default()
        } else {
            BeaconFilter::new(&opts.beacon_hosts)
        };
        let config = Self {
            host_command: opts.host_command.split_whitespace().map(str::to_owned).collect(),
            reconnect: ReconnectPolicy {
                initial_delay_ms: opts.initial_delay_ms,
                max_delay_ms: opts.max_delay_ms,
                max_attempts: opts.max_attempts,
            },
            arbitration: ArbitrationPolicy {
                max_failed_operations: opts.max_failed_operations,
            },
            ad_window: AdWindowPolicy {
                threshold: opts.ad_threshold,
                confirm_window_ms: opts.confirm_window_ms,
                silence_timeout_ms: opts.silence_timeout_ms,
            },
            beacon_filter,
            handshake_timeout: Duration::from_millis(opts.handshake_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_command.is_empty() {
            return Err(ConfigError::EmptyHostCommand);
        }
        if self.ad_window.threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.ad_window.silence_timeout_ms == 0 {
            return Err(ConfigError::ZeroSilenceTimeout);
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::DelayOrder {
                initial_ms: self.reconnect.initial_delay_ms,
                max_ms: self.reconnect.max_delay_ms,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn run_opts(args: &[&str]) -> RunOpts {
        let mut argv = vec!["admute", "run"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).expect("parse").command {
            Command::Run(opts) => opts,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = CoordinatorConfig::from_opts(&run_opts(&[])).expect("valid");
        assert_eq!(config.host_command, vec!["admute-host"]);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(config.ad_window, AdWindowPolicy::default());
        assert_eq!(config.beacon_filter, BeaconFilter::default());
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn host_command_splits_arguments() {
        let config = CoordinatorConfig::from_opts(&run_opts(&[
            "--host-command",
            "/opt/admute/admute-host --backend pactl",
        ]))
        .expect("valid");
        assert_eq!(
            config.host_command,
            vec!["/opt/admute/admute-host", "--backend", "pactl"]
        );
    }

    #[test]
    fn custom_beacon_hosts_replace_defaults() {
        let config =
            CoordinatorConfig::from_opts(&run_opts(&["--beacon-host", "ads.example"])).expect("ok");
        assert_eq!(config.beacon_filter.hosts(), &["ads.example".to_string()]);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            CoordinatorConfig::from_opts(&run_opts(&["--host-command", "  "])).unwrap_err(),
            ConfigError::EmptyHostCommand
        );
        assert_eq!(
            CoordinatorConfig::from_opts(&run_opts(&["--ad-threshold", "0"])).unwrap_err(),
            ConfigError::ZeroThreshold
        );
        assert_eq!(
            CoordinatorConfig::from_opts(&run_opts(&["--silence-timeout-ms", "0"])).unwrap_err(),
            ConfigError::ZeroSilenceTimeout
        );
        assert_eq!(
            CoordinatorConfig::from_opts(&run_opts(&["--initial-delay-ms", "60000"])).unwrap_err(),
            ConfigError::DelayOrder {
                initial_ms: 60_000,
                max_ms: 30_000
            }
        );
    }
}
